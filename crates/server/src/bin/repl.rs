//! Terminal conversation with the counselor
//!
//! Reads patient lines from stdin. The risk assessment asks its questions
//! on the same terminal.

use std::sync::Arc;

use chia_agent::{Agent, CounselorAgent, LineChannel};
use chia_config::load_settings;
use chia_core::AnswerChannel;
use chia_server::{init_tracing, LogOutput, Services};
use chia_tools::create_registry;

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
    let channel = Arc::new(LineChannel::stdio());
    let registry = create_registry(&services.tool_deps, channel.clone());
    let agent = CounselorAgent::new(
        "terminal",
        settings.agent.clone(),
        services.llm.clone(),
        Arc::new(registry),
    );

    channel
        .notify(&format!("Counselor: {}", agent.greet()))
        .await?;

    while let Some(line) = channel.prompt("Patient: ").await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        match agent.process(input).await {
            Ok(reply) => {
                if !reply.text.is_empty() {
                    channel.notify(&format!("Counselor: {}", reply.text)).await?;
                }
                if reply.ended {
                    break;
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "Turn failed");
                channel.notify(&format!("Error: {}", e)).await?;
            },
        }
    }

    Ok(())
}
