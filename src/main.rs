use std::env;
use std::process;

use env_logger;
use maz_connect::ModelRun;


fn main () {
    env_logger::init();
    let cfg_path = match env::args().nth(1) {
        Some(cfg_path) => cfg_path,
        None => {
            eprintln!("usage: maz_connect <run config yaml>");
            process::exit(2);
        }
    };

    let result = ModelRun::from_cfg(&cfg_path).and_then(|run| run.run());
    match result {
        Ok(report) => {
            if !report.is_empty() {
                log::info!("finished with data quality warnings; see above");
            }
        }
        Err(err) => {
            log::error!("{}", err);
            eprintln!("run failed: {}", err);
            process::exit(1);
        }
    }
}
