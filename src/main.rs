use std::{fs, io, process};

use clap::{Parser, Subcommand};

use mdtutor::catalog;
use mdtutor::html::{self, RenderOptions};
use mdtutor::serve;

/// Explicit subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve a content root over HTTP
    Serve {
        /// Content root containing the assets/markdown/ tree
        root: String,
        /// Interface address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        /// Starting port number for the HTTP server
        #[arg(long, default_value = "3333")]
        port: u16,
        /// Strip raw HTML from article sources instead of passing it through
        #[arg(long)]
        sanitize: bool,
    },
    /// Render a single markdown file to HTML on stdout
    Render {
        /// Path to the markdown file
        file: String,
        /// Strip raw HTML from the source instead of passing it through
        #[arg(long)]
        sanitize: bool,
    },
}

#[derive(Parser)]
#[command(
    name = "mdtutor",
    version,
    about = "A markdown tutorial-article viewer and server",
    after_help = "INVOCATION FORMS:\n  mdtutor serve [OPTIONS] <root>     Serve a content root over HTTP\n  mdtutor render [OPTIONS] <file>    Render one file to HTML on stdout"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn render_options(sanitize: bool) -> RenderOptions {
    RenderOptions {
        allow_raw_html: !sanitize,
    }
}

fn main() -> io::Result<()> {
    match Cli::parse().command {
        Commands::Serve {
            root,
            bind,
            port,
            sanitize,
        } => {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(io::Error::other)?;
            rt.block_on(serve::run_serve(root, bind, port, render_options(sanitize)))
        }
        Commands::Render { file, sanitize } => run_render(&file, render_options(sanitize)),
    }
}

/// Render one markdown file to HTML on stdout (no page shell).
fn run_render(file_arg: &str, opts: RenderOptions) -> io::Result<()> {
    let source = fs::read_to_string(file_arg).unwrap_or_else(|e| {
        match e.kind() {
            io::ErrorKind::NotFound => {
                eprintln!("Error: file not found: {file_arg}");
            }
            io::ErrorKind::PermissionDenied => {
                eprintln!("Error: permission denied: {file_arg}");
            }
            _ => {
                eprintln!("Error reading '{file_arg}': {e}");
            }
        }
        process::exit(1);
    });

    let (_, body) = catalog::split_frontmatter(&source);
    let (rendered, _) = html::render_markdown(body, &opts);
    print!("{rendered}");
    Ok(())
}
