//! Gateway configuration.

use std::path::PathBuf;

use clap::Parser;

/// ormrepo HTTP/JSON gateway command line arguments.
#[derive(Debug, Parser)]
#[command(name = "ormrepo-gateway")]
#[command(about = "HTTP/JSON gateway serving paged member listings")]
pub struct Args {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on for HTTP requests.
    #[arg(short, long, default_value_t = 8080)]
    pub port: u16,

    /// Directory of the sled store.
    #[arg(short, long, default_value = "./data")]
    pub data_path: PathBuf,

    /// Use a temporary store that is removed on exit.
    #[arg(long)]
    pub temporary: bool,

    /// Page size when a request does not give one.
    #[arg(long, default_value_t = 10)]
    pub default_page_size: u32,

    /// Largest page size a request may ask for.
    #[arg(long, default_value_t = 2000)]
    pub max_page_size: u32,

    /// Sort applied when a request does not give one, as `prop[,asc|desc]`.
    #[arg(long, default_value = "age,desc")]
    pub default_sort: String,

    /// Number of sample members inserted at startup. Zero disables seeding.
    #[arg(long, default_value_t = 100)]
    pub seed: usize,
}

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to listen on for HTTP requests.
    pub listen_addr: String,
    /// Directory of the sled store.
    pub data_path: PathBuf,
    /// Use a temporary store.
    pub temporary: bool,
    /// Page size when a request does not give one.
    pub default_page_size: u32,
    /// Largest page size a request may ask for.
    pub max_page_size: u32,
    /// Sort applied when a request does not give one.
    pub default_sort: String,
    /// Number of sample members inserted at startup.
    pub seed: usize,
}

impl From<&Args> for GatewayConfig {
    fn from(args: &Args) -> Self {
        Self {
            listen_addr: format!("{}:{}", args.host, args.port),
            data_path: args.data_path.clone(),
            temporary: args.temporary,
            default_page_size: args.default_page_size,
            max_page_size: args.max_page_size,
            default_sort: args.default_sort.clone(),
            seed: args.seed,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            data_path: PathBuf::from("./data"),
            temporary: false,
            default_page_size: 10,
            max_page_size: 2000,
            default_sort: "age,desc".to_string(),
            seed: 100,
        }
    }
}

impl GatewayConfig {
    /// A configuration over a temporary store, for tests.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Default::default()
        }
    }

    /// Set the number of seeded members.
    pub fn with_seed(mut self, seed: usize) -> Self {
        self.seed = seed;
        self
    }
}
