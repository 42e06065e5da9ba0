// SPDX-License-Identifier: GNU GENERAL PUBLIC LICENSE Version 3
//
// Copyleft (c) 2024 James Wong. This file is part of James Wong.
// is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the
// Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// James Wong is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with James Wong.  If not, see <https://www.gnu.org/licenses/>.
//
// IMPORTANT: Any software that fully or partially contains or uses materials
// covered by this license must also be released under the GNU GPL license.
// This includes modifications and derived works.

use banguard_server::{config::config, server};
use clap::{Arg, Command};

#[tokio::main]
pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = Command::new("Banguard")
        .version(config::VERSION.as_str())
        .author("James Wong")
        .about(
            format!("Banguard - A fail2ban driven HTTP Blocking Gateway written in Rust.\n\n{}", config::VERSION.as_str())
                .to_owned(),
        )
        .arg_required_else_help(true) // When no args are provided, show help.
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH") // Tips for the user.
                .help("Set global configuration file")
                .global(true), // Global args are available to all subcommands.
        )
        .subcommand(
            Command::new("serve").about("Run Banguard ban-file driven Blocking Gateway Web Server.").arg(
                Arg::new("verbose")
                    .short('v')
                    .long("verbose")
                    .action(clap::ArgAction::SetTrue)
                    .help("Verbose output."),
            ),
        );

    let matches = app.get_matches();

    if let Some(path) = matches.get_one::<String>("config") {
        std::env::set_var(config::CFG_PATH_ENV, path);
    }

    match matches.subcommand() {
        Some((name, sub_matches)) => match name {
            "serve" => {
                #[allow(unused)]
                let verbose = sub_matches.get_flag("verbose");
                server::start().await?;
            }
            _ => {
                eprintln!("Invalid subcommand: {}", name);
                std::process::exit(1);
            }
        },
        None => {
            tracing::info!("Use <command> --help for more information about a specific command.");
        }
    }

    Ok(())
}
