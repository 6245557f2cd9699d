use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use picshare::{
    auth::dto::PublicUser,
    images::repo_types::Image,
    session::{ClientSession, FileStore, Identity},
};
use reqwest::{multipart, Response};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "picshare")]
#[command(about = "Share images from the command line", long_about = None)]
struct Cli {
    #[arg(long, env = "PICSHARE_API", default_value = "http://localhost:8080/api")]
    api: String,

    #[arg(long, env = "PICSHARE_HOME", help = "Where the session is cached (default ~/.picshare)")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create an account and remember it")]
    Register { email: String, password: String },

    #[command(about = "Log in and remember the identity")]
    Login { email: String, password: String },

    #[command(about = "Forget the cached identity")]
    Logout,

    #[command(about = "Show the cached identity")]
    Whoami,

    #[command(about = "List images")]
    List {
        #[arg(long, help = "Show archived images instead")]
        archived: bool,
    },

    #[command(about = "Upload an image")]
    Upload {
        file: PathBuf,
        #[arg(short, long)]
        title: String,
        #[arg(short, long)]
        description: Option<String>,
    },

    #[command(about = "Archive an image (or restore it with --restore)")]
    Archive {
        id: Uuid,
        #[arg(long)]
        restore: bool,
    },

    #[command(about = "Delete an image")]
    Delete { id: Uuid },

    #[command(about = "Print the share URL of an image")]
    Share { id: Uuid },

    #[command(about = "Remember whether the sidebar is pinned")]
    PinSidebar {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
}

#[derive(Debug, Deserialize)]
struct AuthBody {
    user: PublicUser,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ImagesBody {
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShareBody {
    share_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    image: Image,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

struct Client {
    http: reqwest::Client,
    api: String,
    session: ClientSession<FileStore>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "picshare=warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let home = match cli.home {
        Some(h) => h,
        None => std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join(".picshare"))
            .ok_or_else(|| anyhow!("HOME is not set; pass --home"))?,
    };
    let client = Client {
        http: reqwest::Client::new(),
        api: cli.api.trim_end_matches('/').to_string(),
        session: ClientSession::new(FileStore::new(home)),
    };

    match cli.command {
        Commands::Register { email, password } => client.authenticate("register", email, password).await,
        Commands::Login { email, password } => client.authenticate("login", email, password).await,
        Commands::Logout => {
            client.session.logout()?;
            println!("Logged out");
            Ok(())
        }
        Commands::Whoami => {
            match client.session.restore_identity()? {
                Some(me) => println!("{} ({})", me.email, me.id),
                None => println!("Not logged in"),
            }
            Ok(())
        }
        Commands::List { archived } => client.list(archived).await,
        Commands::Upload {
            file,
            title,
            description,
        } => client.upload(file, title, description).await,
        Commands::Archive { id, restore } => client.archive(id, !restore).await,
        Commands::Delete { id } => client.delete(id).await,
        Commands::Share { id } => client.share(id).await,
        Commands::PinSidebar { state } => {
            client.session.set_sidebar_pinned(state == "on")?;
            Ok(())
        }
    }
}

impl Client {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api, path)
    }

    /// Route guard for commands that act as the cached user.
    fn identity(&self) -> anyhow::Result<(Identity, String)> {
        let me = self.session.require_identity()?;
        let token = me
            .token
            .clone()
            .ok_or_else(|| anyhow!("cached identity has no session token; log in again"))?;
        Ok((me, token))
    }

    async fn authenticate(&self, action: &str, email: String, password: String) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url("/auth"))
            .json(&json!({ "email": email, "password": password, "action": action }))
            .send()
            .await?;
        let body: AuthBody = ok_json(res).await?;
        let me = Identity::new(body.user, body.token);
        self.session.remember(&me)?;
        println!("Logged in as {} ({})", me.email, me.id);
        Ok(())
    }

    async fn list(&self, archived: bool) -> anyhow::Result<()> {
        let res = self
            .http
            .get(self.url("/images"))
            .query(&[("archived", archived)])
            .send()
            .await?;
        let body: ImagesBody = ok_json(res).await?;
        if body.images.is_empty() {
            println!("No images");
            return Ok(());
        }
        let me = self.session.restore_identity()?;
        for img in body.images {
            let mine = me.as_ref().is_some_and(|m| m.id == img.owner_id);
            println!(
                "{}  {}{}  {}",
                img.id,
                img.title,
                if mine { " (yours)" } else { "" },
                img.url
            );
        }
        Ok(())
    }

    async fn upload(&self, file: PathBuf, title: String, description: Option<String>) -> anyhow::Result<()> {
        let (me, token) = self.identity()?;
        let bytes = tokio::fs::read(&file)
            .await
            .with_context(|| format!("read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".into());
        let mime = mime_guess::from_path(&file).first_or_octet_stream();
        let part = multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?;

        let mut form = multipart::Form::new()
            .part("file", part)
            .text("title", title)
            .text("userId", me.id.to_string());
        if let Some(d) = description {
            form = form.text("description", d);
        }

        let res = self
            .http
            .post(self.url("/upload"))
            .bearer_auth(token)
            .multipart(form)
            .send()
            .await?;
        let body: UploadBody = ok_json(res).await?;
        println!("Uploaded {} -> {}", body.image.id, body.image.url);
        Ok(())
    }

    async fn archive(&self, id: Uuid, archived: bool) -> anyhow::Result<()> {
        let (_, token) = self.identity()?;
        let res = self
            .http
            .put(self.url("/images/archive"))
            .bearer_auth(token)
            .json(&json!({ "id": id, "isArchived": archived }))
            .send()
            .await?;
        let image: Image = ok_json(res).await?;
        println!(
            "{} {}",
            image.id,
            if image.is_archived { "archived" } else { "restored" }
        );
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<()> {
        let (_, token) = self.identity()?;
        let res = self
            .http
            .delete(self.url("/images/delete"))
            .bearer_auth(token)
            .json(&json!({ "id": id }))
            .send()
            .await?;
        let _: serde_json::Value = ok_json(res).await?;
        println!("Deleted {}", id);
        Ok(())
    }

    async fn share(&self, id: Uuid) -> anyhow::Result<()> {
        let res = self
            .http
            .post(self.url("/images/share"))
            .json(&json!({ "id": id }))
            .send()
            .await?;
        let body: ShareBody = ok_json(res).await?;
        println!("{}", body.share_url);
        Ok(())
    }
}

async fn ok_json<T: serde::de::DeserializeOwned>(res: Response) -> anyhow::Result<T> {
    let status = res.status();
    if !status.is_success() {
        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|e| e.message)
            .unwrap_or(text);
        bail!("{} ({})", message, status);
    }
    Ok(res.json().await?)
}
