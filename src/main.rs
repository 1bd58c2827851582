use clap::Parser;
use std::io;

mod args;
mod server;

use args::Args;
use gzembed::logging::setup_logging;
use server::start_server;

fn main() -> io::Result<()> {
    setup_logging();
    let args = Args::parse();
    start_server(args)
}
