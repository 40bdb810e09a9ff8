//! tiny11 - Windows 11 ISO trimming tool.

use tiny11_builder::{cli, ui};

fn main() {
    if let Err(e) = cli::run() {
        ui::output::error_chain(&e);
        std::process::exit(1);
    }
}
