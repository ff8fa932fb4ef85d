mod backend;
mod config;
mod error;
mod navigation;
mod ui;

use backend::mangadex::{ChapterPage, MangaDetail, MangaDex, MangaSummary};
use config::Config;
use image::DynamicImage;
use navigation::{Fetch, Route, Screen, Ticket};
use ui::ui::{App, ui};

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use std::{error::Error, io};
use tokio::sync::mpsc;

enum BackgroundTask {
    SearchFinished {
        ticket: Ticket,
        result: error::Result<Vec<MangaSummary>>,
    },
    DetailLoaded {
        ticket: Ticket,
        result: error::Result<Option<MangaDetail>>,
    },
    ChaptersLoaded {
        ticket: Ticket,
        offset: usize,
        result: error::Result<ChapterPage>,
    },
    PagesResolved {
        ticket: Ticket,
        result: error::Result<Vec<String>>,
    },
    PageImageLoaded {
        ticket: Ticket,
        image: Option<DynamicImage>,
    },
}

enum Control {
    Continue,
    Quit,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging();

    let config = Config::load();
    let api = MangaDex::new(&config)?;
    let start = std::env::args()
        .nth(1)
        .map(|path| Route::parse(&path))
        .unwrap_or(Route::Root);
    log::info!("starting at {start:?} against {}", config.api_root());

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(api.page_size());

    let (task_tx, mut task_rx) = mpsc::unbounded_channel::<BackgroundTask>();

    let fetches = app.enter(start);
    spawn_fetches(&api, fetches, &task_tx);

    let debounce = Duration::from_millis(config.search_debounce_ms);
    let res = run_app(&mut terminal, &mut app, &api, &mut task_rx, task_tx, debounce).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        log::error!("{err}");
        eprintln!("{err}");
    }
    Ok(())
}

fn log_file() -> io::Result<File> {
    let dir = dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mangadex-tui");
    fs::create_dir_all(&dir)?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join("mangadex-tui.log"))
}

// The terminal belongs to the UI, so log records go to a file.
fn init_logging() {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    match log_file() {
        Ok(file) => {
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }
        Err(e) => {
            eprintln!("logging disabled: {e}");
            builder.filter_level(log::LevelFilter::Off);
        }
    }
    builder.init();
}

fn spawn_fetches(api: &MangaDex, fetches: Vec<Fetch>, tx: &mpsc::UnboundedSender<BackgroundTask>) {
    for fetch in fetches {
        spawn_fetch(api, fetch, tx.clone());
    }
}

fn spawn_fetch(api: &MangaDex, fetch: Fetch, tx: mpsc::UnboundedSender<BackgroundTask>) {
    let api = api.clone();

    tokio::spawn(async move {
        let task = match fetch {
            Fetch::Search { query, ticket } => BackgroundTask::SearchFinished {
                ticket,
                result: api.search(&query).await,
            },
            Fetch::Detail { manga_id, ticket } => BackgroundTask::DetailLoaded {
                ticket,
                result: api.fetch_detail(&manga_id).await,
            },
            Fetch::Chapters {
                manga_id,
                offset,
                ticket,
            } => BackgroundTask::ChaptersLoaded {
                ticket,
                offset,
                result: api.fetch_chapters(&manga_id, offset).await,
            },
            Fetch::Pages { chapter_id, ticket } => BackgroundTask::PagesResolved {
                ticket,
                result: api.resolve_pages(&chapter_id).await,
            },
            Fetch::PageImage { url, ticket } => BackgroundTask::PageImageLoaded {
                ticket,
                image: api.fetch_page_image(&url).await,
            },
        };
        let _ = tx.send(task);
    });
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    api: &MangaDex,
    task_rx: &mut mpsc::UnboundedReceiver<BackgroundTask>,
    task_tx: mpsc::UnboundedSender<BackgroundTask>,
    debounce: Duration,
) -> io::Result<()> {
    let mut event_stream = EventStream::new();

    loop {
        terminal.draw(|f| ui(f, app))?;

        // Fire the debounced search once typing pauses
        if let Some(typed_at) = app.search_debounce {
            if typed_at.elapsed() >= debounce {
                app.search_debounce = None;
                if app.search_pending() {
                    let fetch = app.search_now();
                    spawn_fetch(api, fetch, task_tx.clone());
                }
            }
        }

        tokio::select! {
            // Timeout to check debounce timer
            _ = tokio::time::sleep(Duration::from_millis(50)) => {}

            Some(Ok(event)) = event_stream.next() => {
                if let Event::Key(key) = event {
                    if key.kind != KeyEventKind::Press {
                        continue;
                    }
                    let control = match app.screen() {
                        Screen::Browsing => handle_search_input(app, key, api, &task_tx),
                        Screen::ChapterBrowsing => handle_chapters_input(app, key, api, &task_tx),
                        Screen::Reading => handle_reader_input(app, key, api, &task_tx),
                    };
                    if let Control::Quit = control {
                        return Ok(());
                    }
                }
            }

            Some(task) = task_rx.recv() => {
                match task {
                    BackgroundTask::SearchFinished { ticket, result } => {
                        app.apply_search(ticket, result);
                    }
                    BackgroundTask::DetailLoaded { ticket, result } => {
                        app.apply_detail(ticket, result);
                    }
                    BackgroundTask::ChaptersLoaded { ticket, offset, result } => {
                        app.apply_chapters(ticket, offset, result);
                    }
                    BackgroundTask::PagesResolved { ticket, result } => {
                        if let Some(fetch) = app.apply_pages(ticket, result) {
                            spawn_fetch(api, fetch, task_tx.clone());
                        }
                    }
                    BackgroundTask::PageImageLoaded { ticket, image } => {
                        app.apply_page_image(ticket, image);
                    }
                }
            }
        }
    }
}

fn is_ctrl_c(key: &KeyEvent) -> bool {
    key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL)
}

fn handle_search_input(
    app: &mut App,
    key: KeyEvent,
    api: &MangaDex,
    task_tx: &mpsc::UnboundedSender<BackgroundTask>,
) -> Control {
    if is_ctrl_c(&key) {
        return Control::Quit;
    }

    match key.code {
        KeyCode::Char(c) => {
            app.search_input.push(c);
            app.search_debounce = Some(Instant::now());
        }
        KeyCode::Backspace => {
            app.search_input.pop();
            app.search_debounce = Some(Instant::now());
        }
        KeyCode::Esc => {
            // An empty query is the unfiltered listing
            app.search_input.clear();
            app.search_debounce = Some(Instant::now());
        }
        KeyCode::Up => app.select_previous_result(),
        KeyCode::Down => app.select_next_result(),
        KeyCode::Enter => {
            if app.search_pending() {
                let fetch = app.search_now();
                spawn_fetch(api, fetch, task_tx.clone());
            } else {
                let fetches = app.open_selected_manga();
                spawn_fetches(api, fetches, task_tx);
            }
        }
        _ => {}
    }
    Control::Continue
}

fn handle_chapters_input(
    app: &mut App,
    key: KeyEvent,
    api: &MangaDex,
    task_tx: &mpsc::UnboundedSender<BackgroundTask>,
) -> Control {
    if is_ctrl_c(&key) {
        return Control::Quit;
    }

    match key.code {
        KeyCode::Char('q') => return Control::Quit,
        KeyCode::Esc => {
            let fetches = app.go_back();
            spawn_fetches(api, fetches, task_tx);
        }
        KeyCode::Up => app.select_previous_chapter(),
        KeyCode::Down => app.select_next_chapter(),
        KeyCode::Left | KeyCode::Char('[') => {
            if let Some(fetch) = app.previous_chapter_page() {
                spawn_fetch(api, fetch, task_tx.clone());
            }
        }
        KeyCode::Right | KeyCode::Char(']') => {
            if let Some(fetch) = app.next_chapter_page() {
                spawn_fetch(api, fetch, task_tx.clone());
            }
        }
        KeyCode::Enter => {
            let fetches = app.open_selected_chapter();
            spawn_fetches(api, fetches, task_tx);
        }
        KeyCode::Char('d') => {
            app.show_description = !app.show_description;
        }
        KeyCode::Char('r') => {
            let fetches = app.reload();
            spawn_fetches(api, fetches, task_tx);
        }
        _ => {}
    }
    Control::Continue
}

fn handle_reader_input(
    app: &mut App,
    key: KeyEvent,
    api: &MangaDex,
    task_tx: &mpsc::UnboundedSender<BackgroundTask>,
) -> Control {
    if is_ctrl_c(&key) {
        return Control::Quit;
    }

    match key.code {
        KeyCode::Char('q') => return Control::Quit,
        KeyCode::Esc => {
            let fetches = app.go_back();
            spawn_fetches(api, fetches, task_tx);
        }
        KeyCode::Left => {
            if let Some(fetch) = app.prev_page() {
                spawn_fetch(api, fetch, task_tx.clone());
            }
        }
        KeyCode::Right => {
            if let Some(fetch) = app.next_page() {
                spawn_fetch(api, fetch, task_tx.clone());
            }
        }
        KeyCode::Char('o') => {
            if let Some(url) = app.current_page_url().map(str::to_string) {
                if let Err(e) = webbrowser::open(&url) {
                    log::warn!("could not open {url}: {e}");
                    app.status = Some(format!("Could not open browser: {e}"));
                }
            }
        }
        KeyCode::Char('r') => {
            let fetches = app.reload();
            spawn_fetches(api, fetches, task_tx);
        }
        _ => {}
    }
    Control::Continue
}
