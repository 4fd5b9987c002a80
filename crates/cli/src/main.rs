// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use caltrack::config::Config;
use caltrack::run::{init_tracing, run};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    if let Err(e) = config.validate() {
        eprintln!("error: {e:#}");
        std::process::exit(2);
    }

    // reqwest is built without a bundled crypto provider.
    let _ = rustls::crypto::ring::default_provider().install_default();
    init_tracing(&config);

    match run(&config).await {
        Ok(Some(output)) => match serde_json::to_string_pretty(&output) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                error!("fatal: {e:#}");
                std::process::exit(1);
            }
        },
        Ok(None) => {}
        Err(e) => {
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    }
}
