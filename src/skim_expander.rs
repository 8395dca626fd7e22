// Moves skims between the coarse zones the assignment engine works with and the micro-zones
// used for access modelling.
use std::collections::BTreeMap;
use std::collections::HashMap;

use ndarray::prelude::*;
use ndarray::Zip;

use super::error::{Error, Result};
use super::geometry_index::ZoneId;


/// Which coarse zone each micro-zone belongs to.  Micro-zones are indexed in id order, coarse
/// zones in the order given.
#[derive(Debug, Clone)]
pub struct ZoneMembership {
    micro_ids: Vec<ZoneId>,
    micro_idxs: HashMap<ZoneId, usize>,
    coarse_ids: Vec<ZoneId>,
    // for each micro-zone index, the index of its coarse zone
    coarse_idx_of_micro: Vec<usize>,
}

impl ZoneMembership {
    pub fn new(micro_to_coarse: &BTreeMap<ZoneId, ZoneId>, coarse_ids: &[ZoneId])
               -> Result<ZoneMembership> {
        let coarse_idxs: HashMap<ZoneId, usize> = coarse_ids.iter().enumerate()
            .map(|(ii, cc)| (*cc, ii))
            .collect();
        if coarse_idxs.len() != coarse_ids.len() {
            return Err(Error::InvalidData(String::from("coarse zone ids are not unique")));
        }

        let mut micro_ids = vec![];
        let mut coarse_idx_of_micro = vec![];
        for (micro, coarse) in micro_to_coarse {
            match coarse_idxs.get(coarse) {
                Some(cidx) => {
                    micro_ids.push(*micro);
                    coarse_idx_of_micro.push(*cidx);
                }
                None => return Err(Error::InvalidData(format!(
                    "micro-zone {} belongs to unknown coarse zone {}", micro, coarse))),
            }
        }
        let micro_idxs = micro_ids.iter().enumerate().map(|(ii, mm)| (*mm, ii)).collect();
        Ok(ZoneMembership {
            micro_ids,
            micro_idxs,
            coarse_ids: coarse_ids.to_vec(),
            coarse_idx_of_micro,
        })
    }

    pub fn get_micro_ids(&self) -> &Vec<ZoneId> {
        &self.micro_ids
    }

    pub fn get_coarse_ids(&self) -> &Vec<ZoneId> {
        &self.coarse_ids
    }

    pub fn num_micro(&self) -> usize {
        self.micro_ids.len()
    }

    pub fn num_coarse(&self) -> usize {
        self.coarse_ids.len()
    }

    pub fn get_micro_idx(&self, micro: ZoneId) -> Option<usize> {
        self.micro_idxs.get(&micro).copied()
    }

    pub fn get_coarse_idx(&self, micro_idx: usize) -> usize {
        self.coarse_idx_of_micro[micro_idx]
    }

    /// The 0/1 matrix `M` with `M[micro, coarse] = 1` iff the micro-zone is in the coarse zone.
    pub fn indicator_matrix(&self) -> Array2<f64> {
        let mut indicator = Array2::zeros((self.num_micro(), self.num_coarse()));
        for (ii, cidx) in self.coarse_idx_of_micro.iter().enumerate() {
            indicator[[ii, *cidx]] = 1.;
        }
        indicator
    }

    /// Replicates each coarse value over every pair of micro-zones in the two coarse zones.
    /// For finite skims this is `M . skim . M^T`; it's computed by lookup so that infinite
    /// values stay infinite.
    pub fn expand(&self, coarse: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_coarse_dims(coarse.view())?;
        let num_micro = self.num_micro();
        let mut expanded: Array2<f64> = Array2::zeros((num_micro, num_micro));
        let cidxs = &self.coarse_idx_of_micro;
        Zip::indexed(&mut expanded).par_for_each(|(ii, jj), val| {
            *val = coarse[[cidxs[ii], cidxs[jj]]];
        });
        Ok(expanded)
    }

    /// The mean over each (coarse origin, coarse destination) block of a micro-zone matrix.
    /// Blocks with no micro-zones are NaN.
    pub fn aggregate_mean(&self, expanded: &Array2<f64>) -> Result<Array2<f64>> {
        let num_micro = self.num_micro();
        if expanded.dim() != (num_micro, num_micro) {
            return Err(Error::DimensionMismatch {
                name: String::from("micro-zone matrix"),
                expected: num_micro,
                found: expanded.nrows().max(expanded.ncols()),
            });
        }
        let num_coarse = self.num_coarse();
        let mut sums: Array2<f64> = Array2::zeros((num_coarse, num_coarse));
        let mut counts: Array2<f64> = Array2::zeros((num_coarse, num_coarse));
        for ((ii, jj), val) in expanded.indexed_iter() {
            let block = [self.coarse_idx_of_micro[ii], self.coarse_idx_of_micro[jj]];
            sums[block] += *val;
            counts[block] += 1.;
        }
        Zip::from(&mut sums).and(&counts).for_each(|sum, count| {
            *sum = if *count > 0. { *sum / *count } else { f64::NAN };
        });
        Ok(sums)
    }

    /// A micro-zone view of a coarse matrix that looks values up without building the full
    /// expanded matrix.
    pub fn expanded_view<'a>(&'a self, coarse: ArrayView2<'a, f64>) -> Result<ExpandedSkim<'a>> {
        self.check_coarse_dims(coarse)?;
        Ok(ExpandedSkim{membership: self, values: coarse, not_computed: None})
    }

    fn check_coarse_dims(&self, coarse: ArrayView2<f64>) -> Result<()> {
        let num_coarse = self.num_coarse();
        if coarse.dim() != (num_coarse, num_coarse) {
            return Err(Error::DimensionMismatch {
                name: String::from("coarse-zone matrix"),
                expected: num_coarse,
                found: coarse.nrows().max(coarse.ncols()),
            });
        }
        Ok(())
    }
}


#[derive(Debug, Clone)]
pub struct ExpandedSkim<'a> {
    membership: &'a ZoneMembership,
    values: ArrayView2<'a, f64>,
    not_computed: Option<ArrayView2<'a, bool>>,
}

impl<'a> ExpandedSkim<'a> {
    pub fn with_not_computed(mut self, mask: ArrayView2<'a, bool>) -> ExpandedSkim<'a> {
        self.not_computed = Some(mask);
        self
    }

    /// The value for a pair of micro-zone indices.
    pub fn get(&self, origin_idx: usize, dest_idx: usize) -> f64 {
        let oo = self.membership.get_coarse_idx(origin_idx);
        let dd = self.membership.get_coarse_idx(dest_idx);
        self.values[[oo, dd]]
    }

    pub fn is_not_computed(&self, origin_idx: usize, dest_idx: usize) -> bool {
        match &self.not_computed {
            Some(mask) => {
                let oo = self.membership.get_coarse_idx(origin_idx);
                let dd = self.membership.get_coarse_idx(dest_idx);
                mask[[oo, dd]]
            }
            None => false,
        }
    }
}
