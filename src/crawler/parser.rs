//! Recursive extractor and work-queue driver
//!
//! The parser owns the crawl's state machine. Four tasks run concurrently:
//!
//! - the **queue pump** dedups discovered URLs and forwards fresh ones to
//!   the logist (it is the only owner of the `processed` set);
//! - the **delivery pump** parses fetched documents, stores them, and
//!   re-queues the child pages each parse discovers;
//! - the **error pump** logs every rejected page;
//! - the **stats pump** periodically reports progress.
//!
//! Extraction itself is synchronous and recursive: each grammar route
//! selects nodes under the current scope and either captures text, recurses
//! into a block entity, or emits child pages to fetch.

use crate::crawler::logist::{LogistHandle, LogistStreams};
use crate::crawler::tracker::WorkTracker;
use crate::crawler::FailedPage;
use crate::grammar::{Entity, EntityKind, Grammar, Route, RouteKind};
use crate::page::{Block, Page, Value};
use crate::storage::Storage;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pending-work queue capacity; producers block when a deep site fills it
const QUEUE_CAPACITY: usize = 100_000;
const ERRORS_CAPACITY: usize = 64;

const STATS_INTERVAL: Duration = Duration::from_secs(10);

/// Errors from parsing a delivered page
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unknown page type \"{0}\"")]
    UnknownPageType(String),
}

/// The crawl state machine: extraction plus the pumps that drive it
pub struct Parser<S> {
    extractor: Extractor,
    logist: LogistHandle<S>,
    queue_tx: mpsc::Sender<Page>,
    queue_rx: mpsc::Receiver<Page>,
    errors_tx: mpsc::Sender<FailedPage>,
    errors_rx: mpsc::Receiver<FailedPage>,
    tracker: WorkTracker,
}

/// Cloneable handle for queueing pages into the crawl
#[derive(Clone)]
pub struct ParserHandle {
    queue_tx: mpsc::Sender<Page>,
    tracker: WorkTracker,
}

impl ParserHandle {
    /// Queues a page, registering it with the work tracker
    ///
    /// Blocks when the queue is full; that back-pressure is what keeps deep
    /// sites from ballooning memory.
    pub async fn queue(&self, page: Page) {
        self.tracker.begin();
        if self.queue_tx.send(page).await.is_err() {
            tracing::warn!("parser: queue closed, dropping page");
            self.tracker.finish();
        }
    }
}

impl<S: Storage + 'static> Parser<S> {
    /// Creates a parser for the given grammar
    pub fn new(grammar: &Grammar, logist: LogistHandle<S>) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::channel(ERRORS_CAPACITY);

        Parser {
            extractor: Extractor::new(grammar),
            logist,
            queue_tx,
            queue_rx,
            errors_tx,
            errors_rx,
            tracker: WorkTracker::new(),
        }
    }

    pub fn handle(&self) -> ParserHandle {
        ParserHandle {
            queue_tx: self.queue_tx.clone(),
            tracker: self.tracker.clone(),
        }
    }

    pub fn tracker(&self) -> WorkTracker {
        self.tracker.clone()
    }

    /// Spawns the four pump tasks
    pub fn start(self, logist_streams: LogistStreams) -> Vec<JoinHandle<()>> {
        tracing::info!("parser: starting");

        let handle = self.handle();

        vec![
            tokio::spawn(run_queue_pump(
                self.queue_rx,
                self.logist.clone(),
                self.tracker.clone(),
            )),
            tokio::spawn(run_delivery_pump(
                logist_streams.delivery,
                self.extractor,
                self.logist,
                handle,
                self.errors_tx,
                self.tracker.clone(),
            )),
            tokio::spawn(run_error_pump(
                self.errors_rx,
                logist_streams.errors,
                self.tracker.clone(),
            )),
            tokio::spawn(run_stats_pump(self.tracker, self.queue_tx)),
        ]
    }
}

/// Dedups queued URLs and forwards fresh work to the logist
///
/// This task is the sole owner of the `processed` set, so cycle avoidance
/// needs no synchronisation: the same URL may be discovered many times
/// before fetching, and in-flight duplicates collapse here to one fetch.
async fn run_queue_pump<S: Storage>(
    mut queue_rx: mpsc::Receiver<Page>,
    logist: LogistHandle<S>,
    tracker: WorkTracker,
) {
    let mut processed: HashSet<String> = HashSet::new();

    while let Some(page) = queue_rx.recv().await {
        if !processed.insert(page.url.clone()) {
            tracing::debug!("parser: skip {} (already processed)", page.url);
            tracker.finish();
            continue;
        }

        tracing::debug!("parser: sending {} to logist", page.url);
        logist.fetch(page).await;
    }
}

/// Parses delivered pages, stores them, and re-queues discovered children
async fn run_delivery_pump<S: Storage>(
    mut delivery: mpsc::Receiver<Page>,
    extractor: Extractor,
    logist: LogistHandle<S>,
    handle: ParserHandle,
    errors_tx: mpsc::Sender<FailedPage>,
    tracker: WorkTracker,
) {
    while let Some(mut page) = delivery.recv().await {
        // Files are stored as-is, never parsed
        if page.is_file {
            logist.store(page);
            tracker.finish();
            continue;
        }

        match extractor.parse(&mut page) {
            Ok(children) => {
                let referrer = page.full_url.clone();
                logist.store(page);

                for mut child in children {
                    child.referrer_url = referrer.clone();
                    handle.queue(child).await;
                }
                tracker.finish();
            }
            Err(error) => {
                let failed = FailedPage::new(page, error);
                if errors_tx.send(failed).await.is_err() {
                    // error pump gone; account for the page here
                    tracker.finish();
                }
            }
        }
    }
}

/// Logs every page rejected by the pipeline
async fn run_error_pump(
    mut parse_errors: mpsc::Receiver<FailedPage>,
    mut fetch_errors: mpsc::Receiver<FailedPage>,
    tracker: WorkTracker,
) {
    loop {
        let failed = tokio::select! {
            failed = parse_errors.recv() => failed,
            failed = fetch_errors.recv() => failed,
        };

        let Some(failed) = failed else { break };
        tracing::error!(
            "parser: rejected {} [dropped to nowhere]: {}",
            failed.page.url,
            failed.error
        );
        tracker.finish();
    }
}

/// Periodically reports pipeline depth
async fn run_stats_pump(tracker: WorkTracker, queue_tx: mpsc::Sender<Page>) {
    let mut interval = tokio::time::interval(STATS_INTERVAL);
    interval.tick().await;

    loop {
        interval.tick().await;
        let queued = queue_tx.max_capacity() - queue_tx.capacity();
        tracing::info!(
            "parser: {} pages in flight, {} queued",
            tracker.pending(),
            queued
        );
    }
}

/// The pure, synchronous half of the parser: grammar-driven extraction
struct Extractor {
    pages: HashMap<String, Entity>,
    blocks: HashMap<String, Entity>,
}

impl Extractor {
    fn new(grammar: &Grammar) -> Self {
        let index = |kind| {
            grammar
                .entities_of(kind)
                .map(|entity| (entity.name.clone(), entity.clone()))
                .collect()
        };

        Extractor {
            pages: index(EntityKind::Page),
            blocks: index(EntityKind::Block),
        }
    }

    /// Parses a fetched page, attaching its tree and returning child pages
    fn parse(&self, page: &mut Page) -> Result<Vec<Page>, ParseError> {
        tracing::info!("parser: parsing {}", page.url);

        let entity = self
            .pages
            .get(&page.name)
            .ok_or_else(|| ParseError::UnknownPageType(page.name.clone()))?;

        let html = String::from_utf8_lossy(&page.body);
        let document = Html::parse_document(&html);
        let (tree, children) = self.parse_entity(document.root_element(), entity);

        page.tree = Some(tree);
        Ok(children)
    }

    /// Applies an entity's routes to a DOM scope, in declared order
    fn parse_entity(&self, scope: ElementRef, entity: &Entity) -> (Block, Vec<Page>) {
        let mut block = Block::new();
        let mut children = Vec::new();

        for route in &entity.routes {
            let Ok(selector) = Selector::parse(&route.selector) else {
                // validation catches this at load time; tolerate it here
                tracing::warn!("parser: skipping invalid selector \"{}\"", route.selector);
                block.set_field(route.target.clone(), Vec::new());
                continue;
            };

            let matches: Vec<ElementRef> = scope.select(&selector).collect();

            let (values, mut found) = match route.kind {
                RouteKind::Page => self.route_pages(&matches, route, false),
                RouteKind::File => self.route_pages(&matches, route, true),
                RouteKind::Block => self.route_block(&matches, route),
            };

            block.set_field(route.target.clone(), values);
            children.append(&mut found);
        }

        (block, children)
    }

    /// A `page` or `file` route: matched URLs become field values and
    /// child pages to fetch
    fn route_pages(
        &self,
        matches: &[ElementRef],
        route: &Route,
        is_file: bool,
    ) -> (Vec<Value>, Vec<Page>) {
        let mut values = Vec::new();
        let mut pages = Vec::new();

        for url in extract_urls(matches) {
            tracing::debug!("parser: found {} \"{}\": {}", route.kind, route.target, url);

            values.push(Value::Text(url.clone()));
            pages.push(if is_file {
                Page::file(&route.target, url)
            } else {
                Page::new(&route.target, url)
            });
        }

        (values, pages)
    }

    /// A `block` route: recurse into the block entity when one is declared,
    /// otherwise capture the combined trimmed text of the selection
    fn route_block(&self, matches: &[ElementRef], route: &Route) -> (Vec<Value>, Vec<Page>) {
        if let Some(entity) = self.blocks.get(&route.target) {
            let mut values = Vec::new();
            let mut pages = Vec::new();

            for scope in matches {
                let (block, mut found) = self.parse_entity(*scope, entity);
                values.push(Value::Block(block));
                pages.append(&mut found);
            }

            return (values, pages);
        }

        let text: String = matches.iter().flat_map(|scope| scope.text()).collect();
        (vec![Value::Text(text.trim().to_string())], Vec::new())
    }
}

/// Extracts one URL per matched node
///
/// A node's URL is the `href` of its first descendant carrying one, or
/// failing that the `href` of the node itself or its nearest ancestor.
/// Nodes with no reachable `href` are skipped silently.
fn extract_urls(matches: &[ElementRef]) -> Vec<String> {
    let Ok(href_selector) = Selector::parse("[href]") else {
        return Vec::new();
    };

    let mut urls = Vec::new();
    for scope in matches {
        if let Some(descendant) = scope.select(&href_selector).next() {
            if let Some(href) = descendant.value().attr("href") {
                urls.push(href.to_string());
                continue;
            }
        }

        if let Some(href) = closest_href(*scope) {
            urls.push(href);
        }
    }

    urls
}

/// Returns the `href` of the element or its nearest ancestor carrying one
fn closest_href(element: ElementRef) -> Option<String> {
    if let Some(href) = element.value().attr("href") {
        return Some(href.to_string());
    }

    for ancestor in element.ancestors() {
        if let Some(ancestor) = ElementRef::wrap(ancestor) {
            if let Some(href) = ancestor.value().attr("href") {
                return Some(href.to_string());
            }
        }
    }

    None
}
