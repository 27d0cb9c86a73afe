#![doc = include_str!("../README.md")]

use anyhow::{Context, bail};
use blog_tonic_core::proto::{
    Blog, CreateBlogReq, DeleteBlogReq, ListBlogReq, ReadBlogReq, UpdateBlogReq,
    blog_service_client::BlogServiceClient,
};
use clap::{Args, Parser, Subcommand};
use tokio_stream::StreamExt;
use tonic::{Code, codec::CompressionEncoding, transport::Channel};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "blog-client", version, about = "Talk to a running blog-tonic-server")]
struct Cli {
    /// Server URI.
    ///
    /// Environment variable: `BLOG_SERVER_ADDR`
    #[arg(long, env = "BLOG_SERVER_ADDR", default_value_t = String::from("http://127.0.0.1:50051"))]
    addr: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a post and print it with its assigned id.
    Create(PostArgs),
    /// Fetch a single post.
    Read { id: String },
    /// Replace the author, title and content of a post.
    Update {
        id: String,
        #[command(flatten)]
        post: PostArgs,
    },
    /// Delete a post.
    Delete { id: String },
    /// Stream every stored post.
    List,
    /// Walk a fresh post through create, read, update, list and delete.
    Demo,
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long)]
    author_id: String,
    #[arg(long)]
    title: String,
    #[arg(long)]
    content: String,
}

impl PostArgs {
    fn into_blog(self, id: String) -> Blog {
        Blog {
            id,
            author_id: self.author_id,
            title: self.title,
            content: self.content,
        }
    }
}

type Client = BlogServiceClient<Channel>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let client = BlogServiceClient::connect(cli.addr.clone())
        .await
        .with_context(|| format!("failed to connect to {}", cli.addr))?
        .send_compressed(CompressionEncoding::Zstd)
        .accept_compressed(CompressionEncoding::Zstd);

    match cli.command {
        Command::Create(post) => {
            create(client, post.into_blog(String::new())).await?;
        }
        Command::Read { id } => {
            read(client, id).await?;
        }
        Command::Update { id, post } => {
            update(client, post.into_blog(id)).await?;
        }
        Command::Delete { id } => delete(client, id).await?,
        Command::List => {
            list(client).await?;
        }
        Command::Demo => demo(client).await?,
    }

    Ok(())
}

async fn create(mut client: Client, blog: Blog) -> anyhow::Result<Blog> {
    let res = client
        .create_blog(CreateBlogReq { blog: Some(blog) })
        .await
        .context("CreateBlog failed")?;
    let blog = res.into_inner().blog.context("CreateBlog returned no blog")?;
    tracing::info!("Created: {blog:?}");
    Ok(blog)
}

async fn read(mut client: Client, id: String) -> anyhow::Result<Blog> {
    let res = client
        .read_blog(ReadBlogReq { id })
        .await
        .context("ReadBlog failed")?;
    let blog = res.into_inner().blog.context("ReadBlog returned no blog")?;
    tracing::info!("Read: {blog:?}");
    Ok(blog)
}

async fn update(mut client: Client, blog: Blog) -> anyhow::Result<Blog> {
    let res = client
        .update_blog(UpdateBlogReq { blog: Some(blog) })
        .await
        .context("UpdateBlog failed")?;
    let blog = res.into_inner().blog.context("UpdateBlog returned no blog")?;
    tracing::info!("Updated: {blog:?}");
    Ok(blog)
}

async fn delete(mut client: Client, id: String) -> anyhow::Result<()> {
    let res = client
        .delete_blog(DeleteBlogReq { id: id.clone() })
        .await
        .context("DeleteBlog failed")?;
    tracing::info!("Deleted {id}: success={}", res.into_inner().success);
    Ok(())
}

async fn list(mut client: Client) -> anyhow::Result<Vec<Blog>> {
    let mut stream = client
        .list_blogs(ListBlogReq {})
        .await
        .context("ListBlogs failed")?
        .into_inner();

    let mut blogs = Vec::new();
    while let Some(msg) = stream.next().await {
        let msg = msg.context("ListBlogs stream failed")?;
        if let Some(blog) = msg.blog {
            tracing::info!("Listed: {blog:?}");
            blogs.push(blog);
        }
    }
    tracing::info!("Listed {} blogs", blogs.len());
    Ok(blogs)
}

async fn demo(client: Client) -> anyhow::Result<()> {
    let created = create(
        client.clone(),
        Blog {
            id: String::new(),
            author_id: "1".to_string(),
            title: "Hello world".to_string(),
            content: "First publish".to_string(),
        },
    )
    .await?;

    let fetched = read(client.clone(), created.id.clone()).await?;
    if fetched != created {
        bail!("read back {fetched:?}, expected {created:?}");
    }

    let updated = update(
        client.clone(),
        Blog {
            title: "Hello new world".to_string(),
            ..created.clone()
        },
    )
    .await?;
    if updated.id != created.id || updated.title != "Hello new world" {
        bail!("unexpected update result {updated:?}");
    }

    let listed = list(client.clone()).await?;
    if !listed.iter().any(|b| b.id == created.id) {
        bail!("{} missing from ListBlogs", created.id);
    }

    delete(client.clone(), created.id.clone()).await?;

    let mut client = client;
    match client.read_blog(ReadBlogReq { id: created.id }).await {
        Err(status) if status.code() == Code::NotFound => {
            tracing::info!("Read after delete: {}", status.message());
            Ok(())
        }
        Err(status) => bail!("expected NOT_FOUND after delete, got {status}"),
        Ok(res) => bail!("blog still readable after delete: {:?}", res.into_inner()),
    }
}
