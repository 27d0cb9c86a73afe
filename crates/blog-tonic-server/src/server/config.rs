use anyhow::bail;
use clap::Parser;

/// Runtime configuration for the `blog-tonic-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is honored), with defaults suitable for a local MongoDB.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "blog-tonic-server",
    version,
    about = "A gRPC service for creating, reading, updating, deleting and listing blog posts"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/blog-uds.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// MongoDB connection string.
    ///
    /// Environment variable: `MONGO_URI`
    #[arg(long, env = "MONGO_URI", default_value_t = String::from("mongodb://localhost:27017"))]
    pub mongo_uri: String,

    /// Database holding the blog collection.
    ///
    /// Environment variable: `MONGO_DATABASE`
    #[arg(long, env = "MONGO_DATABASE", default_value_t = String::from("mydb"))]
    pub database: String,

    /// Collection holding one document per blog post.
    ///
    /// Environment variable: `MONGO_COLLECTION`
    #[arg(long, env = "MONGO_COLLECTION", default_value_t = String::from("blog"))]
    pub collection: String,

    /// Capacity of the buffer between the `ListBlogs` cursor and the gRPC
    /// stream.
    ///
    /// The cursor is only advanced when there is room in this buffer, so a
    /// slow client holds the scan back instead of the server accumulating
    /// documents. Lower values increase backpressure responsiveness; higher
    /// values enable deeper pipelining.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 16)]
    pub stream_buffer_size: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub mongo_uri: String,
    pub database: String,
    pub collection: String,
    pub stream_buffer_size: usize,
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if !(args.mongo_uri.starts_with("mongodb://") || args.mongo_uri.starts_with("mongodb+srv://"))
        {
            bail!("MONGO_URI must start with `mongodb://` or `mongodb+srv://`");
        }

        if args.database.trim().is_empty() {
            bail!("MONGO_DATABASE must not be empty");
        }

        if args.collection.trim().is_empty() {
            bail!("MONGO_COLLECTION must not be empty");
        }

        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            mongo_uri: args.mongo_uri,
            database: args.database,
            collection: args.collection,
            stream_buffer_size: args.stream_buffer_size,
        })
    }
}
