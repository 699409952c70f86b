use anyhow::Result;
use clap::Parser;

use ironhook_core::config::IronhookConfig;
use ironhook_daemon::cli::DaemonCli;
use ironhook_daemon::orchestrator::{self, Orchestrator};
use ironhook_daemon::logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // 설정 로드: 파일 -> 환경변수 -> CLI
    let mut config = IronhookConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "ironhook-daemon starting"
    );

    if cli.validate {
        let kb = orchestrator::load_knowledge_base(&config.rules.path).await?;
        println!(
            "configuration OK; knowledge base '{}' v{} with {} rules ({} enabled)",
            kb.name(),
            kb.version(),
            kb.rule_count(),
            kb.enabled_rule_count()
        );
        return Ok(());
    }

    let mut daemon = Orchestrator::build_from_config(config).await?;
    daemon.run().await
}
