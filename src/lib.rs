// imports of other modules from this crate
mod error;
pub use error::{DataQualityReport, Error, IssueTally, Result};

mod geometry;
pub use geometry::{polygon_centroid, Point2d};

mod geometry_index;
pub use geometry_index::{Endpoint, GeometryIndex, Link, NetworkFiles, Node, NodeId, Stop,
                         StopClass, StopId, Zone, ZoneId, UNCLASSIFIED_STOP};

mod path_network;
pub use path_network::PathNetwork;

mod my_dijkstra;

mod config_utils;

mod connectors;
pub use connectors::{ConnectorBuilder, ConnectorConfig, ConnectorMode, ConnectorOutputs,
                     ConnectorRecord, ConnectorSource, ConnectorTable, DistanceCeiling,
                     StopAccessTable, NO_CANDIDATE};

mod skims;
pub use skims::{SkimCore, SkimFileSpec, SkimSet};

mod skim_expander;
pub use skim_expander::{ExpandedSkim, ZoneMembership};

mod service;
pub use service::{ServiceAvailability, ZoneService};

mod accessibility;
pub use accessibility::{AccessibilityComposer, AccessibilityRow, ComposerConfig,
                        FlexFleetParams, MicromobilityParams, RideCost, TrafficSkim,
                        TransitAlternative, SKIM_NOT_COMPUTED};

mod model_run;
pub use model_run::{ModelRun, RunConfig};

#[cfg(test)]
mod test_utils;


pub static FEET_PER_MILE: f64 = 5280.;

/// Defines the walking and cycling speeds shared by every stage that turns distances into
/// times.
pub trait ActiveModeConfig {
    fn get_walk_speed_mph(&self) -> f64;
    fn get_bike_speed_mph(&self) -> f64;

    /// Minutes to walk `distance` miles.
    fn walk_minutes(&self, distance: f64) -> f64 {
        return distance / self.get_walk_speed_mph() * 60.;
    }

    fn bike_minutes(&self, distance: f64) -> f64 {
        return distance / self.get_bike_speed_mph() * 60.;
    }
}
