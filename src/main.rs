use std::process;

use anyhow::Result;
use log::*;

use engine::{Config, Engine, RenderError, DEFAULT_CONFIG_PATH};

fn run() -> Result<()> {
    let config = Config::load_or_default(DEFAULT_CONFIG_PATH);
    Engine::new(&config)?.run()
}

fn main() {
    pretty_env_logger::init();

    if let Err(error) = run() {
        match error.downcast_ref::<RenderError>() {
            Some(render_error) => error!(
                "{} {}: {}",
                render_error.kind.stage(),
                render_error.kind.subsystem(),
                render_error.message
            ),
            None => error!("{:#}", error),
        }
        process::exit(1);
    }
}
