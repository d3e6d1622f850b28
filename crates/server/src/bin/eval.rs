//! Evaluation runner
//!
//! Answers the built-in question sets through the knowledge chain and writes
//! one JSON file per set for external scoring.

use std::path::PathBuf;

use chia_config::load_settings;
use chia_rag::{write_records, EvalSet};
use chia_server::{init_tracing, LogOutput, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = std::env::var("CHIA_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        },
    };

    init_tracing(&settings.observability, LogOutput::Stderr);

    let services = Services::build(&settings).await?;
    let out_dir = PathBuf::from(&settings.rag.eval_output_dir);

    for set in EvalSet::all() {
        let records = set.run(&services.qa).await;
        let path = set.output_path(&out_dir);
        write_records(&path, &records).await?;
        tracing::info!(
            set = %set.name,
            records = records.len(),
            path = %path.display(),
            "Wrote evaluation records"
        );
    }

    Ok(())
}
