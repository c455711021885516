use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use folioview_core::{
    document_id_for_path, CaptureMode, DocumentEngine, DocumentView, FileStateStore,
    HighlightColor, HighlightId, HighlightRecord, HighlightStore, PageNumber,
    PersistedDocumentState, Rect, RenderState, Rotation, StateStore, ViewerConfig, ViewerError,
};
use folioview_pdfium::{save_png, PdfiumEngine};
use serde::Serialize;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(
    name = "folioview",
    version,
    about = "Render pages, capture regions and manage highlights of PDF documents"
)]
struct Args {
    /// Directory for logs and persisted document state
    #[arg(long, env = "FOLIOVIEW_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Viewer configuration file (TOML)
    #[arg(long, env = "FOLIOVIEW_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct ViewArgs {
    /// Container width in css pixels
    #[arg(long, default_value_t = 800.0)]
    width: f64,

    /// Device pixel ratio used for the raster
    #[arg(long, default_value_t = 1.0)]
    dpr: f64,

    #[arg(long)]
    zoom: Option<f64>,

    /// Clockwise rotation in degrees (0, 90, 180 or 270)
    #[arg(long, value_parser = parse_rotation)]
    rotation: Option<Rotation>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Render one page to a PNG file
    Render {
        file: PathBuf,

        /// 1-based page; defaults to the last page viewed
        #[arg(short, long)]
        page: Option<u32>,

        #[command(flatten)]
        view: ViewArgs,

        #[arg(short, long)]
        out: PathBuf,
    },
    /// Capture a drag-box region and print it as JSON
    Region {
        file: PathBuf,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        /// Screen-space box relative to the page: x,y,width,height
        #[arg(long, value_parser = parse_rect)]
        rect: Rect,

        #[command(flatten)]
        view: ViewArgs,

        /// Where to write the cropped image
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List, add or remove stored highlights
    Highlights {
        file: PathBuf,

        #[command(subcommand)]
        action: HighlightAction,
    },
}

#[derive(Debug, Subcommand)]
enum HighlightAction {
    List {
        #[arg(short, long)]
        page: Option<u32>,
    },
    Add {
        #[arg(short, long)]
        page: u32,

        /// Page-space rectangle, repeatable: x,y,width,height
        #[arg(long = "rect", value_parser = parse_rect, required = true)]
        rects: Vec<Rect>,

        #[arg(long, default_value = "yellow")]
        color: HighlightColor,

        #[arg(long)]
        text: String,
    },
    Remove {
        id: HighlightId,
    },
}

#[derive(Debug, Serialize)]
struct RenderSummary {
    page: PageNumber,
    width: u32,
    height: u32,
    rotation: Rotation,
    zoom: f64,
    out: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let project_dirs = ProjectDirs::from("net", "folioview", "folioview")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| project_dirs.data_local_dir().to_path_buf());
    let _log_guard = init_logging(&data_dir)?;

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| project_dirs.config_dir().join("config.toml"));
    let config = ViewerConfig::load(&config_path)?;
    let store = FileStateStore::new(data_dir.join("state"))?;

    match args.command {
        Command::Render {
            file,
            page,
            view,
            out,
        } => render(&store, config, &file, page, &view, &out).await,
        Command::Region {
            file,
            page,
            rect,
            view,
            out,
        } => region(&store, config, &file, page, rect, &view, out.as_deref()).await,
        Command::Highlights { file, action } => highlights(&store, &file, action),
    }
}

async fn render(
    store: &dyn StateStore,
    config: ViewerConfig,
    file: &Path,
    page: Option<u32>,
    view_args: &ViewArgs,
    out: &Path,
) -> Result<()> {
    let id = document_id_for_path(file);
    let persisted = load_state(store, file)?;
    let view = open_view(file, config).await?;
    apply_view(&view, view_args, persisted.as_ref());

    let page = page
        .or_else(|| persisted.as_ref().and_then(|s| s.current_page).map(PageNumber::get))
        .unwrap_or(1);
    let page = show_page(&view, page).await?;

    let raster = view
        .raster(page)
        .ok_or_else(|| anyhow!("page {page} produced no raster"))?;
    save_png(&raster, out)?;
    info!(page = page.get(), out = %out.display(), "page written");

    let sidebar_width = persisted
        .as_ref()
        .map(|s| s.preferences.sidebar_width)
        .unwrap_or_else(|| PersistedDocumentState::default().preferences.sidebar_width);
    store
        .save(id, &view.persisted_state(sidebar_width))
        .map_err(ViewerError::Store)?;

    let viewport = view.viewport();
    print_json(&RenderSummary {
        page,
        width: raster.width,
        height: raster.height,
        rotation: viewport.rotation(),
        zoom: viewport.zoom(),
        out: out.to_path_buf(),
    })
}

async fn region(
    store: &dyn StateStore,
    config: ViewerConfig,
    file: &Path,
    page: u32,
    rect: Rect,
    view_args: &ViewArgs,
    out: Option<&Path>,
) -> Result<()> {
    let persisted = load_state(store, file)?;
    let view = open_view(file, config).await?;
    apply_view(&view, view_args, persisted.as_ref());
    let page = show_page(&view, page).await?;

    view.set_capture_mode(CaptureMode::Region);
    view.pointer_down(page, rect.origin());
    let selection = view.pointer_up(rect.far_corner()).ok_or_else(|| {
        anyhow!(
            "region is smaller than the {}px minimum",
            view.config().min_region_size
        )
    })?;

    if let Some(out) = out {
        match &selection.image {
            Some(image) => save_png(image, out)?,
            None => warn!("page raster unavailable, no region image written"),
        }
    }
    print_json(&selection)
}

fn highlights(store: &dyn StateStore, file: &Path, action: HighlightAction) -> Result<()> {
    let id = document_id_for_path(file);
    let mut state = load_state(store, file)?.unwrap_or_default();
    let mut highlights = HighlightStore::from_records(std::mem::take(&mut state.highlights));

    match action {
        HighlightAction::List { page } => {
            let records: Vec<&HighlightRecord> = match page {
                Some(page) => highlights.list(parse_page(page)?),
                None => highlights.all().iter().collect(),
            };
            return print_json(&records);
        }
        HighlightAction::Add {
            page,
            rects,
            color,
            text,
        } => {
            let record = HighlightRecord::new(parse_page(page)?, color, text.trim(), rects);
            println!("{}", record.id);
            info!(id = %record.id, page, "highlight added");
            highlights.add(record);
        }
        HighlightAction::Remove { id: highlight } => {
            let removed = highlights
                .remove(highlight)
                .ok_or(ViewerError::HighlightNotFound(highlight))?;
            info!(id = %removed.id, "highlight removed");
        }
    }

    state.highlights = highlights.all().to_vec();
    store.save(id, &state).map_err(ViewerError::Store)?;
    Ok(())
}

async fn open_view(file: &Path, config: ViewerConfig) -> Result<DocumentView> {
    let bytes = fs::read(file).with_context(|| format!("failed to read {:?}", file))?;
    let engine: Arc<dyn DocumentEngine> = Arc::new(PdfiumEngine::new()?);
    let view = DocumentView::open(engine, bytes, config)
        .await
        .with_context(|| format!("failed to open {:?}", file))?;
    info!(path = %file.display(), pages = view.page_count(), "document loaded");
    Ok(view)
}

fn load_state(store: &dyn StateStore, file: &Path) -> Result<Option<PersistedDocumentState>> {
    store
        .load(document_id_for_path(file))
        .map_err(ViewerError::Store)
        .with_context(|| format!("failed to load saved state for {:?}", file))
}

fn apply_view(view: &DocumentView, args: &ViewArgs, persisted: Option<&PersistedDocumentState>) {
    if let Some(state) = persisted {
        view.restore(state);
    }
    if let Some(zoom) = args.zoom {
        view.set_zoom(zoom);
    }
    if let Some(rotation) = args.rotation {
        view.set_rotation(rotation);
    }
    view.set_device_pixel_ratio(args.dpr);
    view.set_container_width(args.width);
}

/// Scrolls the page into view and renders it.
async fn show_page(view: &DocumentView, page: u32) -> Result<PageNumber> {
    let page = parse_page(page)?;
    if page.index() >= view.page_count() {
        return Err(ViewerError::PageOutOfRange(page.get()).into());
    }
    let height = view
        .page_box(page)
        .map(|b| b.height)
        .ok_or_else(|| anyhow!("container width must be positive"))?;
    view.jump_to_page(page, height);
    match view.render_page(page).await? {
        RenderState::Rendered => Ok(page),
        state => bail!("page {page} did not render (state {state:?})"),
    }
}

fn parse_page(page: u32) -> Result<PageNumber> {
    PageNumber::new(page).ok_or_else(|| anyhow!("page numbers start at 1"))
}

fn parse_rect(s: &str) -> Result<Rect, String> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|err| format!("invalid number in {s:?}: {err}"))?;
    match parts.as_slice() {
        [x, y, width, height] if *width >= 0.0 && *height >= 0.0 => {
            Ok(Rect::new(*x, *y, *width, *height))
        }
        [_, _, _, _] => Err(format!("rectangle {s:?} has a negative size")),
        _ => Err(format!("expected x,y,width,height, got {s:?}")),
    }
}

fn parse_rotation(s: &str) -> Result<Rotation, String> {
    s.trim()
        .parse::<i32>()
        .ok()
        .and_then(Rotation::from_degrees)
        .ok_or_else(|| format!("rotation must be 0, 90, 180 or 270, got {s:?}"))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(data_dir: &Path) -> Result<WorkerGuard> {
    let log_dir = data_dir.join("logs");
    fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::never(log_dir, "folioview.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries command output
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_arguments_parse_four_numbers() {
        assert_eq!(
            parse_rect("10, 20.5,30,40").unwrap(),
            Rect::new(10.0, 20.5, 30.0, 40.0)
        );
        assert!(parse_rect("1,2,3").is_err());
        assert!(parse_rect("1,2,-3,4").is_err());
        assert!(parse_rect("a,b,c,d").is_err());
    }

    #[test]
    fn rotation_arguments_accept_quarter_turns_only() {
        assert_eq!(parse_rotation("270").unwrap(), Rotation::Deg270);
        assert!(parse_rotation("45").is_err());
    }

    #[test]
    fn highlight_actions_round_trip_through_the_store() {
        let store = folioview_core::MemoryStateStore::new();
        let file = Path::new("/tmp/folioview-notes.pdf");
        highlights(
            &store,
            file,
            HighlightAction::Add {
                page: 2,
                rects: vec![Rect::new(1.0, 2.0, 3.0, 4.0)],
                color: HighlightColor::Green,
                text: " noted ".into(),
            },
        )
        .unwrap();
        let state = store.load(document_id_for_path(file)).unwrap().unwrap();
        assert_eq!(state.highlights.len(), 1);
        assert_eq!(state.highlights[0].source_text, "noted");

        let id = state.highlights[0].id;
        highlights(&store, file, HighlightAction::Remove { id }).unwrap();
        let state = store.load(document_id_for_path(file)).unwrap().unwrap();
        assert!(state.highlights.is_empty());
        assert!(highlights(&store, file, HighlightAction::Remove { id }).is_err());
    }
}
