use anyhow::Result;
use clap::Parser;

use browsepilot::app::App;
use browsepilot::args::Args;
use browsepilot::config::Config;
use browsepilot::engine::{self, EngineConfig};
use browsepilot::logging::{self, LogConfig};
use browsepilot::theme as t;
use browsepilot::{auth, tui};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();
    t::init_color(args.no_color);

    let mut config = Config::load(args.config_path())?;
    args.apply_overrides(&mut config);

    let log_path = logging::init(LogConfig::from_env(), &config.log_dir())?;

    tui::install_panic_hook();

    let outcome = auth::authenticate(config.password.as_deref());
    if let Some(message) = outcome.message() {
        println!("{}", t::icon_fail(message));
    }
    if !outcome.is_granted() {
        std::process::exit(outcome.exit_code());
    }

    let engine_config = EngineConfig::resolve(&config.engine);
    if engine_config.api_key.is_none() {
        println!(
            "{}",
            t::icon_warn(&format!(
                "{} is not set; tasks will fail until it is",
                config.engine.api_key_env
            ))
        );
    }
    tracing::info!(
        log = %log_path.display(),
        engine = ?engine_config,
        "Starting browsepilot"
    );

    let mut app = App::new(&config, engine_config, engine::default_factory());
    app.run().await?;
    println!(
        "{}",
        t::icon_ok(&format!(
            "{} session ended {}",
            t::accent("browsepilot"),
            t::muted(&format!("(diagnostics: {})", log_path.display()))
        ))
    );
    Ok(())
}
