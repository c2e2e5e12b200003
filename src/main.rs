use std::cell::RefCell;
use std::fs::File;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{error, info};
use simplelog::{Config, LevelFilter, WriteLogger};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::LocalSet;

use folio::debounce::Debouncer;
use folio::notification::{NotificationLevel, NotificationManager};
use folio::panic_handler;
use folio::pdf::MupdfProvider;
use folio::reader::{Canvas, GoTo, Outcome, PageNumber, Reader, ReaderParts, Viewer};
use folio::settings::{self, Settings};
use folio::storage::FileStore;

const WHEEL_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Parser, Debug)]
#[command(name = "folio", version, about = "Offline-first PDF reader")]
struct Args {
    /// PDF to open (defaults to `document_path` from the config)
    document: Option<PathBuf>,

    /// Config file (defaults to <config dir>/folio/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for progress, bookmarks and cached pages
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Initial zoom factor
    #[arg(long)]
    zoom: Option<f32>,

    /// off, error, warn, info, debug or trace
    #[arg(long, default_value = "info", value_parser = parse_level)]
    log_level: LevelFilter,
}

fn parse_level(raw: &str) -> Result<LevelFilter, String> {
    raw.parse()
        .map_err(|_| format!("unknown log level '{raw}'"))
}

struct ConsoleViewer;

impl Viewer for ConsoleViewer {
    fn set_busy(&self, busy: bool) {
        if busy {
            println!("  rendering...");
        }
    }

    fn present(&self, page: PageNumber, canvas: &Canvas) {
        println!("  [page {page}: {}x{} px]", canvas.width(), canvas.height());
    }
}

const HELP: &str = "\
commands:
  n / p            next / previous page
  first / last     first / last page
  g <N>            go to page N
  ] / [            wheel down / up (debounced)
  b <name>         bookmark the current page
  r <N> <name>     rename the bookmark on page N
  d <N>            delete the bookmark on page N
  j <N>            jump to the bookmark on page N
  list             list bookmarks
  z <F> / + / - / 0  set / increase / decrease / reset zoom
  offline / online simulate connectivity changes
  save <file.png>  write the visible page to a file
  q                quit";

fn main() -> Result<()> {
    let args = Args::parse();
    panic_handler::initialize_panic_handler();

    WriteLogger::init(args.log_level, Config::default(), File::create("folio.log")?)?;
    info!("Starting folio");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    let result = local.block_on(&runtime, run(args));

    if let Err(e) = &result {
        error!("Application error: {e:?}");
    }
    info!("Shutting down folio");
    result
}

async fn run(args: Args) -> Result<()> {
    let settings = Settings::load_or_default(args.config.as_deref());

    let Some(document) = args.document.or_else(|| settings.document_path.clone()) else {
        bail!("no document given and no document_path configured");
    };
    let data_dir = args
        .data_dir
        .or_else(|| settings.data_dir.clone())
        .or_else(settings::default_data_dir)
        .context("could not determine a data directory; pass --data-dir")?;
    let storage = FileStore::open(&data_dir)
        .with_context(|| format!("failed to open data directory {data_dir:?}"))?;

    let mut config = settings.reader_config();
    if let Some(zoom) = args.zoom {
        config.default_zoom = zoom;
    }

    let notifications = Rc::new(RefCell::new(NotificationManager::new()));
    let opened = Reader::open(ReaderParts {
        path: document.clone(),
        config,
        provider: Rc::new(MupdfProvider),
        storage: Rc::new(storage),
        remote: None,
        notifier: notifications.clone(),
        viewer: Rc::new(ConsoleViewer),
        user: None,
    })
    .await;
    print_notifications(&notifications);
    let reader = opened.with_context(|| format!("failed to open {document:?}"))?;

    let changes = reader.subscribe();
    let toasts = notifications.clone();
    tokio::task::spawn_local(async move {
        while let Ok(change) = changes.recv_async().await {
            println!("page {} / {}", change.page, change.page_count);
            print_notifications(&toasts);
        }
    });

    let (wheel, wheel_rx) = Debouncer::<i64>::new(WHEEL_DEBOUNCE);
    let wheel_reader = reader.clone();
    tokio::task::spawn_local(async move {
        while let Ok(delta) = wheel_rx.recv_async().await {
            let outcome = if delta > 0 {
                wheel_reader.next_page().await
            } else {
                wheel_reader.previous_page().await
            };
            report(&outcome);
        }
    });

    println!("{HELP}");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();

        match cmd {
            "" => {}
            "q" | "quit" => break,
            "n" => report(&reader.next_page().await),
            "p" => report(&reader.previous_page().await),
            "first" => report(&reader.first_page().await),
            "last" => report(&reader.last_page().await),
            "g" => report(&reader.jump_to_input(rest).await),
            "]" => wheel.push(1),
            "[" => wheel.push(-1),
            "b" => {
                if let Err(e) = reader.add_bookmark(rest).await {
                    println!("! {e}");
                }
            }
            "r" => {
                let (page, name) = rest.split_once(' ').unwrap_or((rest, ""));
                match parse_page(page) {
                    Some(page) => {
                        if let Err(e) = reader.rename_bookmark(page, name).await {
                            println!("! {e}");
                        }
                    }
                    None => println!("! usage: r <page> <name>"),
                }
            }
            "d" => match parse_page(rest) {
                Some(page) => {
                    if let Err(e) = reader.delete_bookmark(page).await {
                        println!("! {e}");
                    }
                }
                None => println!("! usage: d <page>"),
            },
            "j" => match parse_page(rest) {
                Some(page) => match reader.jump_to_bookmark(page).await {
                    Ok(outcome) => report(&outcome),
                    Err(e) => println!("! {e}"),
                },
                None => println!("! usage: j <page>"),
            },
            "list" => {
                let bookmarks = reader.bookmarks().await;
                if bookmarks.is_empty() {
                    println!("  no bookmarks");
                }
                for bookmark in bookmarks {
                    println!("  {:>5}  {}", bookmark.page, bookmark.name);
                }
            }
            "z" => match rest.parse::<f32>() {
                Ok(factor) => report(&reader.set_zoom(factor).await),
                Err(_) => println!("! usage: z <factor>"),
            },
            "+" => report(&reader.zoom_in().await),
            "-" => report(&reader.zoom_out().await),
            "0" => report(&reader.reset_zoom().await),
            "offline" => reader.set_online(false),
            "online" => reader.set_online(true),
            "force" => match rest.parse::<i64>() {
                Ok(page) => report(&reader.go_to(page, GoTo::FORCE).await),
                Err(_) => println!("! usage: force <page>"),
            },
            "save" => {
                if let Err(e) = save_canvas(&reader, rest).await {
                    println!("! {e:#}");
                }
            }
            "help" | "?" => println!("{HELP}"),
            other => println!("! unknown command '{other}' (try 'help')"),
        }
        print_notifications(&notifications);
    }

    wheel.cancel();
    reader.settle().await?;
    reader.shutdown();
    Ok(())
}

fn print_notifications(manager: &RefCell<NotificationManager>) {
    for toast in manager.borrow_mut().drain() {
        match toast.level {
            NotificationLevel::Info => println!("  {}", toast.message),
            NotificationLevel::Warning => println!("! {}", toast.message),
            NotificationLevel::Error => println!("!! {}", toast.message),
        }
    }
}

fn parse_page(raw: &str) -> Option<PageNumber> {
    raw.trim().parse::<u32>().ok().and_then(PageNumber::new)
}

fn report(outcome: &Outcome) {
    match outcome {
        Outcome::Displayed(_) | Outcome::Superseded | Outcome::Rejected(_) => {}
        Outcome::Unchanged(page) => println!("  still on page {page}"),
        Outcome::Failed(reason) => println!("!! {reason}"),
        Outcome::Closed => println!("!! reader closed"),
    }
}

async fn save_canvas(reader: &Reader, path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("usage: save <file.png>");
    }
    let canvas = reader.canvas().await.context("nothing displayed yet")?;
    let image = canvas.encode_png()?;
    std::fs::write(path, image.as_bytes()).with_context(|| format!("failed to write {path}"))?;
    println!("  saved {path}");
    Ok(())
}
