use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};
use server::config::ServerConfig;
use server::geometry::MapGeometry;
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, loads map data and runs the server until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::parse();

    env_logger::Builder::from_env(Env::default().default_filter_or(&config.log_level)).init();

    let geometry = match &config.map_data {
        Some(path) => {
            let geometry = MapGeometry::load(path)?;
            if geometry.map != config.map {
                warn!(
                    "Map data in {} describes {:?}, but the active map is {:?}",
                    path.display(),
                    geometry.map,
                    config.map
                );
            }
            info!(
                "Loaded {:?} geometry: {} vent(s)",
                geometry.map,
                geometry.vents.len()
            );
            Some(geometry)
        }
        None => None,
    };

    let mut server = Server::new(&config, geometry).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
