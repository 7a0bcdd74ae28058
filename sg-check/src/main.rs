/*
 * Created on Wed Jun 04 2025
 *
 * This file is a part of Skygraph
 * Skygraph is a free and open-source embedded graph database that keeps
 * an entire labeled directed graph in a single on-disk file, written by
 * Sayan Nandan ("the Author") with the vision of making very large
 * graphs cheap to store and fast to walk on ordinary machines.
 *
 * Copyright (c) 2025, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! The engine itself never repairs anything: a crash mid-mutation can tear a
//! multi-slot update, and the handle simply refuses to mutate once it notices. This
//! tool is the offline half of that story. It opens the file read-only, runs the full
//! consistency pass and reports every fault it can find, so an operator knows whether
//! a file is safe to keep writing to or is restore-from-backup material.

mod cli;

use {
    crate::cli::Cli,
    clap::Parser,
    env_logger::Builder,
    log::{error, info},
    skygraph::{chk, Graph},
    std::{env, process},
};

fn main() {
    let cli = Cli::parse();
    Builder::new()
        .parse_filters(&env::var("SG_LOG").unwrap_or_else(|_| "info".to_owned()))
        .init();
    let graph = match Graph::open_ro(&cli.file) {
        Ok(g) => g,
        Err(e) => {
            error!("failed to open `{}`: {e}", cli.file);
            process::exit(0x01);
        }
    };
    info!(
        "checking `{}`: header says {} nodes, {} edges",
        cli.file,
        graph.node_count(),
        graph.edge_count()
    );
    let report = match chk::check(&graph) {
        Ok(report) => report,
        Err(e) => {
            error!("check aborted by i/o failure: {e}");
            process::exit(0x01);
        }
    };
    if report.is_clean() {
        info!("file is clean");
        if cli.verbose {
            println!("{report}");
        }
    } else {
        error!("file is damaged");
        println!("{report}");
        process::exit(0x02);
    }
}
