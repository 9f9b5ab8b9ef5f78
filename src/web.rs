use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{LinkIcon, SiteOptions};
use crate::engine::{DEFAULT_TRANSITION, EngineSnapshot, PlaybackInterval};
use crate::error::ControlError;
use crate::events::SlideshowCommand;
use crate::source::{FETCH_FAILED_MESSAGE, ImageRecord, ImageSource};
use crate::tasks::slideshow::SlideshowHandle;

#[derive(Clone)]
pub struct AppState {
    images: Arc<[ImageRecord]>,
    load_error: Option<String>,
    slideshow: Option<SlideshowHandle>,
    catalog: Option<Arc<dyn ImageSource>>,
    poll_interval: Duration,
    site: Arc<SiteOptions>,
}

impl AppState {
    pub fn new(
        images: Arc<[ImageRecord]>,
        load_error: Option<String>,
        slideshow: Option<SlideshowHandle>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            images,
            load_error,
            slideshow,
            catalog: None,
            poll_interval,
            site: Arc::new(SiteOptions::default()),
        }
    }

    /// Serve `/api/images` live from `catalog` instead of the session list.
    pub fn with_catalog(mut self, catalog: Arc<dyn ImageSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Title and header links for rendered pages.
    pub fn with_site(mut self, site: SiteOptions) -> Self {
        self.site = Arc::new(site);
        self
    }

    fn handle(&self) -> Result<&SlideshowHandle, ControlError> {
        self.slideshow.as_ref().ok_or(ControlError::NotRunning)
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_page))
        .route("/api/images", get(images_json))
        .route("/api/state", get(current_state))
        .route("/api/next", post(next_image))
        .route("/api/previous", post(previous_image))
        .route("/api/playback/toggle", post(toggle_playback))
        .route("/api/interval", post(set_interval))
        .with_state(state)
}

/// Bind `bind_addr` and serve until `cancel` fires.
pub async fn serve(state: AppState, bind_addr: SocketAddr, cancel: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind slideshow server on {bind_addr}"))?;
    info!(%bind_addr, "slideshow server listening");
    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move {
            cancel.cancelled().await;
        })
        .await
        .context("slideshow server exited")?;
    Ok(())
}

struct ApiError(ControlError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            ControlError::UnsupportedInterval(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ControlError::NotRunning => StatusCode::CONFLICT,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        Self(err)
    }
}

async fn index_page(State(state): State<AppState>) -> Html<String> {
    let site = &state.site;
    if let Some(err) = &state.load_error {
        debug!(error = %err, "rendering load failure page");
        return Html(layout(site, &render_notice(site, "Failed to load images")));
    }
    if state.images.is_empty() {
        return Html(layout(site, &render_notice(site, "No images found")));
    }
    let snapshot = state.slideshow.as_ref().map(SlideshowHandle::snapshot);
    Html(layout(
        site,
        &render_slideshow(site, &state.images, snapshot.as_ref(), state.poll_interval),
    ))
}

async fn images_json(State(state): State<AppState>) -> Response {
    let Some(catalog) = &state.catalog else {
        return Json(json!({ "images": &*state.images })).into_response();
    };
    match catalog.list_images().await {
        Ok(images) => Json(json!({ "images": images })).into_response(),
        Err(err) => {
            warn!(error = %err, "error fetching images for api");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": FETCH_FAILED_MESSAGE })),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct StateResponse<'a> {
    #[serde(flatten)]
    snapshot: EngineSnapshot,
    current: Option<&'a ImageRecord>,
    next: Option<&'a ImageRecord>,
}

async fn current_state(State(state): State<AppState>) -> Result<Response, ApiError> {
    let snapshot = state.handle()?.snapshot();
    let body = StateResponse {
        current: state.images.get(snapshot.current_index),
        next: snapshot.next_index.and_then(|idx| state.images.get(idx)),
        snapshot,
    };
    Ok(Json(body).into_response())
}

async fn forward(state: &AppState, command: SlideshowCommand) -> Result<StatusCode, ApiError> {
    state.handle()?.send(command).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn next_image(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    forward(&state, SlideshowCommand::Next).await
}

async fn previous_image(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    forward(&state, SlideshowCommand::Previous).await
}

async fn toggle_playback(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    forward(&state, SlideshowCommand::TogglePlayback).await
}

#[derive(Debug, Deserialize)]
struct IntervalRequest {
    interval_ms: u64,
}

async fn set_interval(
    State(state): State<AppState>,
    Json(req): Json<IntervalRequest>,
) -> Result<StatusCode, ApiError> {
    let interval = PlaybackInterval::try_from(req.interval_ms)?;
    forward(&state, SlideshowCommand::SetInterval(interval)).await
}

fn render_notice(site: &SiteOptions, message: &str) -> String {
    format!(
        "{}<section class=\"notice\"><p>{}</p></section>",
        render_header(site),
        escape_html(message)
    )
}

fn render_header(site: &SiteOptions) -> String {
    let mut header = String::new();
    let _ = write!(
        &mut header,
        "<header class=\"top\"><h1>{}</h1>",
        escape_html(&site.title)
    );
    if !site.links.is_empty() {
        header.push_str("<div class=\"links\">");
        for link in &site.links {
            // mailto: and relative links stay in the tab
            let external = if link.url.starts_with("http://") || link.url.starts_with("https://") {
                " target=\"_blank\" rel=\"noopener noreferrer\""
            } else {
                ""
            };
            let content = match link.icon {
                Some(LinkIcon::Mail) => MAIL_ICON.to_string(),
                Some(LinkIcon::Instagram) => INSTAGRAM_ICON.to_string(),
                None => escape_html(&link.label),
            };
            let _ = write!(
                &mut header,
                "<a href=\"{}\" aria-label=\"{}\"{}>{}</a>",
                escape_html(&link.url),
                escape_html(&link.label),
                external,
                content
            );
        }
        header.push_str("</div>");
    }
    header.push_str("</header>");
    header
}

fn render_layer(body: &mut String, image: &ImageRecord, index: usize, class: &str) {
    let _ = write!(
        body,
        "<div class=\"layer{}{}\"><img src=\"{}\" alt=\"{}\" width=\"{}\" height=\"{}\"></div>",
        if class.is_empty() { "" } else { " " },
        class,
        escape_html(&image.url),
        escape_html(&image.alt_or_label(index)),
        image.width,
        image.height
    );
}

fn render_slideshow(
    site: &SiteOptions,
    images: &[ImageRecord],
    snapshot: Option<&EngineSnapshot>,
    poll_interval: Duration,
) -> String {
    let current_index = snapshot
        .map(|s| s.current_index)
        .filter(|idx| *idx < images.len())
        .unwrap_or(0);
    let playing = snapshot.is_some_and(|s| s.is_playing);
    let interval_ms = snapshot
        .map(|s| s.interval_ms)
        .unwrap_or_else(|| PlaybackInterval::default().as_millis());
    let transition_ms = snapshot
        .map(|s| s.transition_ms)
        .unwrap_or(DEFAULT_TRANSITION.as_millis() as u64);

    // Incoming image, only while a transition is in flight.
    let incoming = snapshot
        .filter(|s| s.is_transitioning)
        .and_then(|s| s.next_index)
        .and_then(|idx| images.get(idx).map(|image| (idx, image)));

    let mut body = render_header(site);
    let _ = write!(
        &mut body,
        "<section class=\"show\" data-poll-ms=\"{}\" data-transition-ms=\"{}\" data-live=\"{}\" data-key=\"{}:{}\">",
        poll_interval.as_millis(),
        transition_ms,
        snapshot.is_some(),
        current_index,
        incoming.map(|(idx, _)| idx.to_string()).unwrap_or_default()
    );
    let _ = write!(
        &mut body,
        "<div class=\"stage\"><div class=\"frame\" id=\"frame\" style=\"--wipe: {transition_ms}ms\">"
    );
    let current = images.get(current_index);
    match (current, incoming) {
        (Some(image), Some((next_index, next))) => {
            render_layer(&mut body, image, current_index, "outgoing");
            render_layer(&mut body, next, next_index, "incoming");
            body.push_str("<div class=\"scanline\"></div>");
        }
        (Some(image), None) => render_layer(&mut body, image, current_index, ""),
        (None, _) => {}
    }
    body.push_str("</div>");
    let caption = match incoming {
        Some(_) => "",
        None => current.map(|image| image.caption.as_str()).unwrap_or_default(),
    };
    let _ = write!(
        &mut body,
        "<p class=\"caption\" id=\"caption\">{}</p></div>",
        escape_html(caption)
    );

    body.push_str("<nav class=\"controls\">");
    body.push_str("<button type=\"button\" id=\"prev\" aria-label=\"Previous image\"><svg width=\"20\" height=\"20\" viewBox=\"0 0 20 20\" fill=\"none\"><path d=\"M12 14L8 10L12 6\" stroke=\"currentColor\" stroke-width=\"1.5\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/></svg></button>");
    body.push_str("<div class=\"center\">");
    let _ = write!(
        &mut body,
        "<button type=\"button\" id=\"toggle\" aria-label=\"{}\" data-playing=\"{}\">{}</button>",
        if playing {
            "Pause slideshow"
        } else {
            "Play slideshow"
        },
        playing,
        if playing { PAUSE_ICON } else { PLAY_ICON }
    );
    body.push_str("<select id=\"speed\" aria-label=\"Change slideshow speed\">");
    for interval in PlaybackInterval::ALL {
        let _ = write!(
            &mut body,
            "<option value=\"{}\"{}>{}</option>",
            interval.as_millis(),
            if interval.as_millis() == interval_ms {
                " selected"
            } else {
                ""
            },
            interval.label()
        );
    }
    body.push_str("</select></div>");
    body.push_str("<button type=\"button\" id=\"next\" aria-label=\"Next image\"><svg width=\"20\" height=\"20\" viewBox=\"0 0 20 20\" fill=\"none\"><path d=\"M8 14L12 10L8 6\" stroke=\"currentColor\" stroke-width=\"1.5\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/></svg></button>");
    body.push_str("</nav></section>");
    let _ = write!(&mut body, "<script>{}</script>", script());
    body
}

const PAUSE_ICON: &str = "<svg width=\"16\" height=\"16\" viewBox=\"0 0 16 16\" fill=\"none\"><rect x=\"5\" y=\"4\" width=\"2\" height=\"8\" fill=\"currentColor\"/><rect x=\"9\" y=\"4\" width=\"2\" height=\"8\" fill=\"currentColor\"/></svg>";
const PLAY_ICON: &str = "<svg width=\"16\" height=\"16\" viewBox=\"0 0 16 16\" fill=\"none\"><path d=\"M5 4L11 8L5 12V4Z\" fill=\"currentColor\"/></svg>";

const MAIL_ICON: &str = "<svg width=\"24\" height=\"24\" viewBox=\"0 0 24 24\" fill=\"none\"><path d=\"M3 8L10.89 13.26C11.56 13.7 12.44 13.7 13.11 13.26L21 8M5 19H19C20.1 19 21 18.1 21 17V7C21 5.9 20.1 5 19 5H5C3.9 5 3 5.9 3 7V17C3 18.1 3.9 19 5 19Z\" stroke=\"currentColor\" stroke-width=\"2\" stroke-linecap=\"round\" stroke-linejoin=\"round\"/></svg>";
const INSTAGRAM_ICON: &str = "<svg width=\"20\" height=\"20\" viewBox=\"0 0 24 24\" fill=\"none\"><rect x=\"2\" y=\"2\" width=\"20\" height=\"20\" rx=\"5\" stroke=\"currentColor\" stroke-width=\"2\"/><circle cx=\"12\" cy=\"12\" r=\"4\" stroke=\"currentColor\" stroke-width=\"2\"/><circle cx=\"17.5\" cy=\"6.5\" r=\"1.5\" fill=\"currentColor\"/></svg>";

fn layout(site: &SiteOptions, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html lang=\"en\"><head><meta charset=\"utf-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1\"><title>{}</title><style>{}</style></head><body>{}</body></html>",
        escape_html(&site.title),
        styles(),
        body
    )
}

fn styles() -> &'static str {
    "body { margin: 0; min-height: 100vh; display: flex; flex-direction: column; background: #0f172a; color: #e2e8f0; font-family: system-ui, sans-serif; }\nheader.top { height: 6rem; display: flex; align-items: center; padding: 0 2rem; }\nheader.top { justify-content: space-between; }\nheader.top h1 { margin: 0; font-size: 1.4rem; font-weight: 500; letter-spacing: -0.01em; }\nheader.top .links { display: flex; align-items: center; gap: 0.75rem; }\nheader.top .links a { color: #cbd5e1; padding: 0.4rem; border-radius: 999px; display: inline-flex; }\nheader.top .links a:hover { background: rgba(255,255,255,0.1); }\n.notice { flex: 1; display: flex; align-items: center; justify-content: center; }\n.show { position: absolute; inset: 6rem 0 0 0; display: flex; flex-direction: column; }\n.stage { position: relative; flex: 1; overflow: hidden; padding: 1rem; }\n@media (min-width: 768px) { .stage { padding: 5rem; } }\n.frame { position: relative; width: 100%; height: 100%; overflow: hidden; }\n.layer { position: absolute; inset: 0; display: flex; align-items: center; justify-content: center; }\n.layer img { max-width: 100%; max-height: 100%; width: auto; height: auto; object-fit: contain; }\n.layer.outgoing { clip-path: inset(0 0 0 0); animation: hideRight var(--wipe) ease-in-out forwards; }\n.layer.incoming { clip-path: inset(0 100% 0 0); animation: wipeRight var(--wipe) ease-in-out forwards; }\n.scanline { position: absolute; top: 0; left: 0; width: 3px; height: 100%; background: linear-gradient(to right, transparent, #64748b, transparent); z-index: 50; pointer-events: none; animation: scanLineMove var(--wipe) ease-in-out forwards; }\n@keyframes wipeRight { from { clip-path: inset(0 100% 0 0); } to { clip-path: inset(0 0 0 0); } }\n@keyframes hideRight { from { clip-path: inset(0 0 0 0); } to { clip-path: inset(0 0 0 100%); } }\n@keyframes scanLineMove { from { left: 0; } to { left: 100%; } }\n.caption { position: absolute; bottom: 0.5rem; left: 0; right: 0; margin: 0; text-align: center; font-size: 1.15rem; letter-spacing: -0.01em; }\n.controls { height: 5rem; max-width: 56rem; width: 100%; margin: 0 auto; display: flex; align-items: center; gap: 1rem; }\n.controls .center { flex: 1; display: flex; align-items: center; justify-content: center; gap: 0.5rem; }\n.controls button { background: none; border: none; color: #e2e8f0; padding: 0.5rem; border-radius: 999px; cursor: pointer; }\n.controls button:hover { background: rgba(255,255,255,0.1); }\n.controls select { background: transparent; color: #e2e8f0; border: 1px solid #475569; border-radius: 6px; font-size: 0.75rem; height: 1.75rem; }"
}

/// Polls `/api/state` and replays the engine's transitions client-side.
fn script() -> &'static str {
    r#"(function () {
  const show = document.querySelector('.show');
  if (!show || show.dataset.live !== 'true') return;
  const pollMs = Number(show.dataset.pollMs) || 250;
  const frame = document.getElementById('frame');
  const caption = document.getElementById('caption');
  const toggle = document.getElementById('toggle');
  const speed = document.getElementById('speed');
  const icons = {
    pause: '<svg width="16" height="16" viewBox="0 0 16 16" fill="none"><rect x="5" y="4" width="2" height="8" fill="currentColor"/><rect x="9" y="4" width="2" height="8" fill="currentColor"/></svg>',
    play: '<svg width="16" height="16" viewBox="0 0 16 16" fill="none"><path d="M5 4L11 8L5 12V4Z" fill="currentColor"/></svg>'
  };
  let rendered = show.dataset.key || null;

  function layer(image, index, cls) {
    const div = document.createElement('div');
    div.className = 'layer' + (cls ? ' ' + cls : '');
    const img = document.createElement('img');
    img.src = image.url;
    img.alt = image.alt || 'Photo ' + (index + 1);
    div.appendChild(img);
    return div;
  }

  function render(state) {
    const key = state.current_index + ':' + (state.next_index === null ? '' : state.next_index);
    if (key !== rendered && state.current) {
      rendered = key;
      frame.style.setProperty('--wipe', state.transition_ms + 'ms');
      frame.replaceChildren();
      if (state.is_transitioning && state.next) {
        frame.appendChild(layer(state.current, state.current_index, 'outgoing'));
        frame.appendChild(layer(state.next, state.next_index, 'incoming'));
        const line = document.createElement('div');
        line.className = 'scanline';
        frame.appendChild(line);
        caption.textContent = '';
      } else {
        frame.appendChild(layer(state.current, state.current_index, ''));
        caption.textContent = state.current.caption || '';
      }
    }
    toggle.dataset.playing = String(state.is_playing);
    toggle.setAttribute('aria-label', state.is_playing ? 'Pause slideshow' : 'Play slideshow');
    toggle.innerHTML = state.is_playing ? icons.pause : icons.play;
    if (document.activeElement !== speed) speed.value = String(state.interval_ms);
  }

  async function poll() {
    try {
      const res = await fetch('/api/state');
      if (res.ok) render(await res.json());
    } catch (_) {}
    setTimeout(poll, pollMs);
  }

  function post(path, body) {
    return fetch(path, {
      method: 'POST',
      headers: body ? { 'content-type': 'application/json' } : {},
      body: body ? JSON.stringify(body) : undefined
    });
  }

  document.getElementById('prev').addEventListener('click', () => post('/api/previous'));
  document.getElementById('next').addEventListener('click', () => post('/api/next'));
  toggle.addEventListener('click', () => post('/api/playback/toggle'));
  speed.addEventListener('change', () => post('/api/interval', { interval_ms: Number(speed.value) }));
  poll();
})();"#
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
