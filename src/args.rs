use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[arg(short, long)]
    pub listen_addr: String,

    /// Directory holding the `.gz` files to serve
    #[arg(short, long)]
    pub serve_dir: PathBuf,

    /// Decompress everything at startup and always send identity
    #[arg(short, long)]
    pub decompress: bool,

    /// File served for directory paths
    #[arg(short, long, default_value = "index.html")]
    pub index: String,
}
