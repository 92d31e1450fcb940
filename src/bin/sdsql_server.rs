use std::{net::SocketAddr, path::PathBuf, process};

use clap::Parser;
use sdsql::protocol::DbServer;
use sdsql::protocol::server::DEFAULT_ADDRESS;

#[derive(Debug, Parser)]
struct Cli {
    /// Path to the data directory
    #[arg(default_value = "./sdsql_data")]
    path: PathBuf,
    /// Listen for new connections at address
    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: SocketAddr,
    /// Password for the built-in admin user (only applied on first start)
    #[arg(long, default_value = sdsql::auth::DEFAULT_ADMIN_PASSWORD)]
    admin_password: String,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let server = match DbServer::new(cli.address, &cli.path, &cli.admin_password) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("failed to start server: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = server.listen() {
        eprintln!("server stopped: {e}");
        process::exit(1);
    }
}
