use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "voxel-launcher")]
#[command(about = "Minecraft install and launch backend")]
struct Args {
    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, default_value = "8765")]
    port: u16,

    /// Launcher data directory (settings, caches, game files)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    voxel_launcher_lib::init_tracing(args.debug);
    voxel_launcher_lib::run(args.data_dir, &args.host, args.port).await
}
