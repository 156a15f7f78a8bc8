//! Command-line entry points: run the backend, obtain a token, or print a folder's grid.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{ClientConfig, Config};
use crate::feed::{Credential, HttpPhotoSource, PhotoFeed, TracingNotifier, ViewScope};
use crate::models::{FolderId, LayoutRow, PhotoId};
use crate::resize::ResizeSignal;
use crate::server;

#[derive(Parser, Debug)]
#[command(name = "pixfold")]
#[command(about = "Photo folders with a justified grid")]
pub struct Cli {
    /// Config file (defaults to <config dir>/pixfold/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the REST backend
    Serve {
        #[arg(long)]
        bind: Option<String>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// URL clients use to reach this server
        #[arg(long)]
        public_url: Option<String>,
    },
    /// Log in and print a bearer token
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Upload image files into a folder
    Upload {
        folder: FolderId,
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Delete one image from a folder
    Delete {
        folder: FolderId,
        image: PhotoId,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
    },
    /// Load a folder page by page and print its justified rows
    Grid {
        folder: FolderId,
        /// Pages to load
        #[arg(long, default_value_t = 1)]
        pages: u32,
        /// Container widths as a resize burst; only the settled one is laid out
        #[arg(long = "width", default_values_t = [1200.0])]
        widths: Vec<f64>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long)]
        base_url: Option<String>,
        #[arg(long)]
        target_row_height: Option<f64>,
        #[arg(long)]
        margin: Option<f64>,
        #[arg(long)]
        search_window: Option<usize>,
    },
}

pub async fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Serve {
            bind,
            data_dir,
            public_url,
        } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            if data_dir.is_some() {
                config.server.data_dir = data_dir;
            }
            if let Some(url) = public_url {
                config.server.public_url = url;
            }
            server::serve(&config.server).await
        }
        Command::Login {
            email,
            password,
            base_url,
        } => {
            let base_url = base_url.unwrap_or(config.client.base_url);
            let source = HttpPhotoSource::new(base_url);
            let credential = source
                .login(&email, &password)
                .await
                .context("Login failed")?;
            println!("{}", credential.token());
            Ok(())
        }
        Command::Upload {
            folder,
            files,
            token,
            base_url,
        } => {
            let feed = open_feed(config.client, folder, token, base_url)?;
            let mut failed = 0;
            for path in &files {
                let bytes = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                if !feed.upload(bytes).await {
                    failed += 1;
                }
            }
            feed.scope().close();
            if failed > 0 {
                bail!("{failed} of {} uploads failed", files.len());
            }
            info!(folder, uploaded = files.len(), "upload finished");
            Ok(())
        }
        Command::Delete {
            folder,
            image,
            token,
            base_url,
        } => {
            let feed = open_feed(config.client, folder, token, base_url)?;
            let deleted = feed.delete(image).await;
            feed.scope().close();
            if !deleted {
                bail!("Could not delete image {image}");
            }
            Ok(())
        }
        Command::Grid {
            folder,
            pages,
            widths,
            token,
            base_url,
            target_row_height,
            margin,
            search_window,
        } => {
            let mut layout = config.layout;
            if let Some(height) = target_row_height {
                layout.target_row_height = height;
            }
            if let Some(margin) = margin {
                layout.margin = margin;
            }
            if search_window.is_some() {
                layout.search_window = search_window;
            }

            let feed = open_feed(config.client, folder, token, base_url)?.with_layout(layout);

            feed.load_first_page().await;
            for _ in 1..pages {
                if !feed.pagination().has_more {
                    break;
                }
                feed.load_next_page().await;
            }
            if feed.pagination().page_number == 0 {
                bail!("Could not load folder {folder}");
            }
            info!(
                folder,
                photos = feed.len(),
                pages = feed.pagination().page_number,
                "loaded folder"
            );

            let width = settled_width(&widths).await?;
            print_rows(width, &feed.layout_rows(width));
            feed.scope().close();
            Ok(())
        }
    }
}

/// Builds a feed for one folder over HTTP, with CLI flags taking precedence over config.
fn open_feed(
    client: ClientConfig,
    folder: FolderId,
    token: Option<String>,
    base_url: Option<String>,
) -> Result<PhotoFeed> {
    let token = token
        .or(client.token)
        .context("No token given; pass --token or set client.token (see `pixfold login`)")?;
    let source = Arc::new(HttpPhotoSource::new(base_url.unwrap_or(client.base_url)));
    Ok(PhotoFeed::new(
        folder,
        Credential::bearer(token),
        source,
        Arc::new(TracingNotifier),
        ViewScope::new(),
    ))
}

/// Runs a burst of widths through the resize observer and returns the one it settles on.
async fn settled_width(widths: &[f64]) -> Result<u32> {
    let (width_tx, width_rx) = flume::unbounded();
    let (layout_tx, layout_rx) = flume::unbounded();
    let signal = ResizeSignal::with_default_frame(width_rx, layout_tx);
    for &width in widths {
        width_tx.send(width)?;
    }
    let width = layout_rx.recv_async().await?;
    signal.shutdown().await;
    Ok(width)
}

fn print_rows(width: u32, rows: &[LayoutRow]) {
    println!("container width {width}px, {} rows", rows.len());
    for row in rows {
        let widths: Vec<String> = row
            .items
            .iter()
            .map(|p| format!("#{}:{:.1}", p.photo.id, p.display_w))
            .collect();
        println!(
            "row {:>3}  h={:>7.2}  [{}]",
            row.row_index,
            row.height_px,
            widths.join(" ")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grid() {
        let cli = Cli::try_parse_from([
            "pixfold", "grid", "7", "--pages", "3", "--width", "800", "--width", "1024.5",
        ])
        .unwrap();
        match cli.command {
            Command::Grid {
                folder,
                pages,
                widths,
                ..
            } => {
                assert_eq!(folder, 7);
                assert_eq!(pages, 3);
                assert_eq!(widths, vec![800.0, 1024.5]);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_grid_default_width() {
        let cli = Cli::try_parse_from(["pixfold", "grid", "1"]).unwrap();
        let Command::Grid { widths, pages, .. } = cli.command else {
            panic!("expected grid");
        };
        assert_eq!(widths, vec![1200.0]);
        assert_eq!(pages, 1);
    }

    #[test]
    fn test_parse_upload_and_delete() {
        let cli = Cli::try_parse_from(["pixfold", "upload", "3", "a.jpg", "b.png", "--token", "t"])
            .unwrap();
        let Command::Upload { folder, files, token, .. } = cli.command else {
            panic!("expected upload");
        };
        assert_eq!(folder, 3);
        assert_eq!(files, vec![PathBuf::from("a.jpg"), PathBuf::from("b.png")]);
        assert_eq!(token.as_deref(), Some("t"));

        assert!(Cli::try_parse_from(["pixfold", "upload", "3"]).is_err());

        let cli = Cli::try_parse_from(["pixfold", "delete", "3", "41"]).unwrap();
        let Command::Delete { folder, image, .. } = cli.command else {
            panic!("expected delete");
        };
        assert_eq!((folder, image), (3, 41));
    }

    #[test]
    fn test_open_feed_needs_token() {
        let client = ClientConfig {
            token: None,
            ..Default::default()
        };
        assert!(open_feed(client, 1, None, None).is_err());

        let client = ClientConfig {
            token: Some("from-config".into()),
            ..Default::default()
        };
        let feed = open_feed(client, 9, None, None).unwrap();
        assert_eq!(feed.folder(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_width_takes_last() {
        assert_eq!(settled_width(&[640.0, 900.2, 1280.9]).await.unwrap(), 1280);
    }
}
