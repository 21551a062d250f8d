use jsbridge_lib::cli::Args;

fn main() {
    env_logger::init();
    log::info!("jsbridge host starting up");

    let args = Args::parse_host();
    let config = match args.into_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("jsbridge configuration error: {}", e);
            eprintln!("jsbridge error: {}", e);
            std::process::exit(2);
        }
    };

    log::info!("Bridge port resolved to {}", config.server_config().port);
    if let Err(e) = jsbridge_lib::run_bridge_cli(config) {
        log::error!("jsbridge host error: {}", e);
        eprintln!("jsbridge error: {}", e);
        std::process::exit(1);
    }
}
