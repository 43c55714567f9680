use std::collections::VecDeque;
use std::future::Future;
use std::io;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::{
    DefaultTerminal, Frame,
    layout::{Constraint, Direction, Layout},
    style::Color,
    widgets::ListState,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::api::{
    BackendClient, BulkAddRequest, DownloadRequest, JobTicket, RefreshImageRequest,
    RefreshMetadataRequest, SearchResult, SeriesMetadata,
};
use crate::bulk;
use crate::config::Config;
use crate::error::Result;
use crate::jobs::{JobsPanel, JobsUpdate};
use crate::ui::{
    render_details_view, render_jobs_view, render_library_view, render_search_view, widgets,
};
use crate::watchlist::{self, AddPlan, Frequency, Library, WatchedSeries};

const WATCHED_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum View {
    Library,
    Details,
    Search,
    Jobs,
    AddUrl,
    BulkImport,
    DuplicatePrompt,
    ConfirmRemove,
    Help,
}

impl View {
    /// Dialogs draw on top of the view they were opened from
    fn is_overlay(&self) -> bool {
        matches!(
            self,
            View::AddUrl
                | View::BulkImport
                | View::DuplicatePrompt
                | View::ConfirmRemove
                | View::Help
        )
    }
}

/// Where a URL typed into the add dialog ends up
#[derive(Debug, Clone, PartialEq)]
pub enum AddTarget {
    NewSeries,
    Source(String),
}

pub struct AddDialogState {
    pub target: AddTarget,
    pub input: String,
}

impl Default for AddDialogState {
    fn default() -> Self {
        Self {
            target: AddTarget::NewSeries,
            input: String::new(),
        }
    }
}

/// Library and pool used for series created from this session
#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    pub library: Library,
    pub frequency: Frequency,
    pub use_flaresolverr: bool,
}

/// A title waiting on the user's merge-or-create answer
#[derive(Debug, Clone)]
pub struct PendingAdd {
    pub title: String,
    pub urls: Vec<String>,
    pub existing: WatchedSeries,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoveTarget {
    Series(String),
    Source { folder: String, url: String },
}

/// Answer to the possible-duplicate prompt
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DuplicateChoice {
    Merge,
    CreateNew,
}

/// Which in-flight request a failure belongs to
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RequestKind {
    Watched,
    Search,
    Action,
}

pub struct StatusLine {
    pub text: String,
    pub is_error: bool,
}

pub enum AppMessage {
    WatchedLoaded(Vec<WatchedSeries>),
    SitesLoaded(Vec<String>),
    SearchResults {
        query: String,
        site: Option<String>,
        results: Vec<SearchResult>,
    },
    TitleResolved {
        title: Option<String>,
        urls: Vec<String>,
    },
    MetadataLoaded(String, SeriesMetadata),
    JobQueued(String, JobTicket),
    ActionDone(String),
    ActionError {
        kind: RequestKind,
        message: String,
    },
    Jobs(JobsUpdate),
    RefreshTick,
}

pub struct App {
    pub config: Config,
    pub client: BackendClient,
    pub running: bool,
    pub view: View,
    pub previous_view: View,
    pub accent: Color,

    pub series: Vec<WatchedSeries>,
    pub series_loading: bool,
    pub library_state: ListState,

    pub selected_folder: Option<String>,
    pub sources_state: ListState,
    pub details_metadata: Option<SeriesMetadata>,

    pub search_query: String,
    pub search_results: Vec<SearchResult>,
    pub search_state: ListState,
    pub search_loading: bool,
    pub sites: Vec<String>,
    pub site_filter: Option<usize>,

    pub add_options: AddOptions,
    pub add_dialog: AddDialogState,
    pub bulk_input: String,
    pub pending_adds: VecDeque<PendingAdd>,
    pub remove_target: Option<RemoveTarget>,

    pub jobs: Option<JobsPanel>,
    pub status: Option<StatusLine>,

    pub msg_tx: mpsc::UnboundedSender<AppMessage>,
    pub msg_rx: mpsc::UnboundedReceiver<AppMessage>,
}

impl App {
    pub fn new(config: Config) -> Result<Self> {
        let accent = widgets::parse_accent_color(&config.ui.accent_color);
        let client = BackendClient::from_config(&config)?;
        let (msg_tx, msg_rx) = mpsc::unbounded_channel();

        let add_options = AddOptions {
            library: config.general.default_library,
            frequency: config.general.default_frequency,
            use_flaresolverr: config.general.use_flaresolverr,
        };

        Ok(Self {
            config,
            client,
            running: true,
            view: View::Library,
            previous_view: View::Library,
            accent,

            series: Vec::new(),
            series_loading: false,
            library_state: ListState::default(),

            selected_folder: None,
            sources_state: ListState::default(),
            details_metadata: None,

            search_query: String::new(),
            search_results: Vec::new(),
            search_state: ListState::default(),
            search_loading: false,
            sites: Vec::new(),
            site_filter: None,

            add_options,
            add_dialog: AddDialogState::default(),
            bulk_input: String::new(),
            pending_adds: VecDeque::new(),
            remove_target: None,

            jobs: None,
            status: None,

            msg_tx,
            msg_rx,
        })
    }

    pub async fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        info!(backend = %self.client.base_url(), "Connecting to backend");
        self.refresh_watched();
        self.load_sites();

        let tick_tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(WATCHED_REFRESH_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                if tick_tx.send(AppMessage::RefreshTick).is_err() {
                    break;
                }
            }
        });

        while self.running {
            terminal.draw(|frame| self.render(frame))?;
            self.handle_events().await?;
            self.process_messages();
        }

        self.cleanup();
        Ok(())
    }

    fn process_messages(&mut self) {
        while let Ok(msg) = self.msg_rx.try_recv() {
            self.handle_message(msg);
        }
        self.show_pending_duplicate();
    }

    fn handle_message(&mut self, msg: AppMessage) {
        match msg {
            AppMessage::WatchedLoaded(series) => {
                self.series_loading = false;
                debug!(count = series.len(), "Watched list loaded");
                self.series = series;
                self.clamp_library_selection();

                if self.selected_folder.is_some() && self.selected_series().is_none() {
                    // The series went away underneath the details view
                    self.close_details();
                    if self.view == View::Details {
                        self.view = View::Library;
                    }
                    if self.previous_view == View::Details {
                        self.previous_view = View::Library;
                    }
                }
                self.clamp_sources_selection();
            }
            AppMessage::SitesLoaded(sites) => {
                self.sites = sites;
                self.site_filter = None;
            }
            AppMessage::SearchResults {
                query,
                site,
                results,
            } => {
                self.search_loading = false;
                if query != self.search_query || site.as_deref() != self.current_site() {
                    debug!(query = %query, "Dropping results for an outdated search");
                    return;
                }
                self.search_results = results;
                if self.search_results.is_empty() {
                    self.search_state.select(None);
                    self.set_status("No results");
                } else {
                    self.search_state.select(Some(0));
                }
            }
            AppMessage::TitleResolved { title, urls } => match title {
                Some(title) => self.handle_add_candidate(title, urls),
                None => {
                    let request = self.new_series_request(None, urls);
                    self.queue_download(request, "New series queued".to_string());
                }
            },
            AppMessage::MetadataLoaded(folder, metadata) => {
                if self.selected_folder.as_deref() == Some(folder.as_str()) {
                    self.details_metadata = Some(metadata);
                }
            }
            AppMessage::JobQueued(label, ticket) => {
                info!(job_id = %ticket.job_id, status = %ticket.status, "{}", label);
                self.set_status(format!("{} ({})", label, ticket.status));
                self.refresh_watched();
            }
            AppMessage::ActionDone(message) => {
                info!("{}", message);
                self.set_status(message);
                self.refresh_watched();
            }
            AppMessage::ActionError { kind, message } => {
                error!(error = %message, ?kind, "Backend request failed");
                match kind {
                    RequestKind::Watched => self.series_loading = false,
                    RequestKind::Search => self.search_loading = false,
                    RequestKind::Action => {}
                }
                self.set_error(message);
            }
            AppMessage::Jobs(update) => {
                if let Some(panel) = self.jobs.as_mut() {
                    panel.apply(update);
                }
            }
            AppMessage::RefreshTick => {
                if !self.series_loading {
                    self.refresh_watched();
                }
            }
        }
    }

    fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(3),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let base = if self.view.is_overlay() {
            self.previous_view
        } else {
            self.view
        };
        self.render_base(frame, chunks[0], base);

        match self.view {
            View::AddUrl => self.render_add_dialog(frame),
            View::BulkImport => self.render_bulk_dialog(frame),
            View::DuplicatePrompt => self.render_duplicate_prompt(frame),
            View::ConfirmRemove => self.render_confirm_remove(frame),
            View::Help => self.render_help(frame),
            _ => {}
        }

        if let Some(status) = &self.status {
            use ratatui::style::Style;
            use ratatui::widgets::Paragraph;

            let color = if status.is_error { Color::Red } else { Color::Green };
            frame.render_widget(
                Paragraph::new(status.text.as_str()).style(Style::default().fg(color)),
                chunks[1],
            );
        }

        let hints: &[(&str, &str)] = match self.view {
            View::Library => &[
                ("/", "search"),
                ("a", "add url"),
                ("b", "bulk import"),
                ("J", "jobs"),
                ("?", "help"),
                ("q", "quit"),
            ],
            View::Details => &[
                ("r", "re-download"),
                ("a", "add source"),
                ("c", "cover"),
                ("m", "metadata"),
                ("?", "help"),
                ("Esc", "back"),
            ],
            View::Search => &[
                ("Enter", "search/add"),
                ("Ctrl+s", "site"),
                ("Tab", "next"),
                ("Esc", "back"),
            ],
            View::Jobs => &[("r", "poll now"), ("?", "help"), ("Esc", "back")],
            View::AddUrl | View::BulkImport => &[
                ("Enter", "confirm"),
                ("Tab", "library"),
                ("S-Tab", "frequency"),
                ("Esc", "cancel"),
            ],
            View::DuplicatePrompt => &[("m", "merge"), ("n", "create new"), ("Esc", "cancel")],
            View::ConfirmRemove => &[("Enter", "remove"), ("Esc", "cancel")],
            View::Help => &[("Esc", "close")],
        };
        frame.render_widget(widgets::help_bar(hints), chunks[2]);
    }

    fn render_base(&mut self, frame: &mut Frame, area: ratatui::layout::Rect, view: View) {
        match view {
            View::Details => {
                let folder = self.selected_folder.clone();
                match folder.and_then(|f| watchlist::find_by_folder(&self.series, &f).cloned()) {
                    Some(series) => render_details_view(
                        frame,
                        area,
                        &series,
                        self.details_metadata.as_ref(),
                        &mut self.sources_state,
                        self.accent,
                    ),
                    None => self.render_library(frame, area),
                }
            }
            View::Search => {
                let site = self.current_site().map(str::to_string);
                render_search_view(
                    frame,
                    area,
                    &self.search_query,
                    &self.search_results,
                    &mut self.search_state,
                    self.search_loading,
                    site.as_deref(),
                    self.accent,
                );
            }
            View::Jobs => match &self.jobs {
                Some(panel) => render_jobs_view(frame, area, panel, self.accent),
                None => self.render_library(frame, area),
            },
            _ => self.render_library(frame, area),
        }
    }

    fn render_library(&mut self, frame: &mut Frame, area: ratatui::layout::Rect) {
        render_library_view(
            frame,
            area,
            &self.series,
            &mut self.library_state,
            self.series_loading,
            self.accent,
        );
    }

    async fn handle_events(&mut self) -> Result<()> {
        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    return Ok(());
                }
                if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
                    self.running = false;
                    return Ok(());
                }

                match self.view {
                    View::Library => self.handle_library_input(key.code),
                    View::Details => self.handle_details_input(key.code),
                    View::Search => self.handle_search_input(key),
                    View::Jobs => self.handle_jobs_input(key.code),
                    View::AddUrl => self.handle_add_input(key),
                    View::BulkImport => self.handle_bulk_input(key),
                    View::DuplicatePrompt => self.handle_duplicate_input(key.code),
                    View::ConfirmRemove => self.handle_confirm_remove_input(key.code),
                    View::Help => self.handle_help_input(key.code),
                }
            }
        }
        Ok(())
    }

    fn handle_library_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => {
                self.running = false;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_selection_down(View::Library);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_selection_up(View::Library);
            }
            KeyCode::Enter | KeyCode::Char('l') | KeyCode::Right => {
                self.open_details();
            }
            KeyCode::Char('R') => {
                self.refresh_watched();
            }
            KeyCode::Char('r') => {
                if let Some(series) = self.highlighted_series().cloned() {
                    self.redownload(&series);
                }
            }
            KeyCode::Char('x') => {
                if let Some(series) = self.highlighted_series() {
                    let target = RemoveTarget::Series(series.series_folder_name.clone());
                    self.open_confirm_remove(target);
                }
            }
            KeyCode::Char('/') => {
                self.view = View::Search;
                self.search_query.clear();
                self.search_results.clear();
                self.search_state.select(None);
            }
            KeyCode::Char('a') => {
                self.open_add_dialog(AddTarget::NewSeries);
            }
            KeyCode::Char('b') => {
                self.bulk_input.clear();
                self.open_overlay(View::BulkImport);
            }
            KeyCode::Char('J') => {
                self.open_jobs();
            }
            KeyCode::Char('?') => {
                self.toggle_help();
            }
            _ => {}
        }
    }

    fn handle_details_input(&mut self, key: KeyCode) {
        let Some(series) = self.selected_series().cloned() else {
            self.view = View::Library;
            return;
        };

        match key {
            KeyCode::Char('q') => {
                self.running = false;
            }
            KeyCode::Esc | KeyCode::Char('h') | KeyCode::Left => {
                self.close_details();
                self.view = View::Library;
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_selection_down(View::Details);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_selection_up(View::Details);
            }
            KeyCode::Char('r') => {
                self.redownload(&series);
            }
            KeyCode::Char('c') => {
                self.refresh_cover(&series);
            }
            KeyCode::Char('m') => {
                self.refresh_metadata(&series);
            }
            KeyCode::Char('a') => {
                self.open_add_dialog(AddTarget::Source(series.series_folder_name.clone()));
            }
            KeyCode::Char('x') => {
                let url = self
                    .sources_state
                    .selected()
                    .and_then(|i| series.series_urls.get(i))
                    .cloned();
                if let Some(url) = url {
                    self.open_confirm_remove(RemoveTarget::Source {
                        folder: series.series_folder_name.clone(),
                        url,
                    });
                }
            }
            KeyCode::Char('X') => {
                self.open_confirm_remove(RemoveTarget::Series(series.series_folder_name.clone()));
            }
            KeyCode::Char('?') => {
                self.toggle_help();
            }
            _ => {}
        }
    }

    fn handle_search_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.view = View::Library;
            }
            KeyCode::Char('s') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.cycle_site();
            }
            KeyCode::Tab | KeyCode::Down => {
                self.move_selection_down(View::Search);
            }
            KeyCode::Up => {
                self.move_selection_up(View::Search);
            }
            KeyCode::Backspace => {
                self.search_query.pop();
                self.clear_search_results();
            }
            KeyCode::Enter => {
                if self.search_results.is_empty() {
                    self.perform_search();
                } else {
                    self.add_selected_result();
                }
            }
            KeyCode::Char(c) => {
                if !key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                {
                    self.search_query.push(c);
                    self.clear_search_results();
                }
            }
            _ => {}
        }
    }

    fn handle_jobs_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('q') => {
                self.running = false;
            }
            KeyCode::Esc | KeyCode::Char('J') => {
                self.close_jobs();
                self.view = View::Library;
            }
            KeyCode::Char('r') => {
                self.start_job_poller();
            }
            KeyCode::Char('?') => {
                self.toggle_help();
            }
            _ => {}
        }
    }

    fn handle_add_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.close_overlay();
            }
            KeyCode::Enter => {
                self.submit_add_dialog();
            }
            KeyCode::Tab => {
                self.add_options.library = self.add_options.library.next();
            }
            KeyCode::BackTab => {
                self.add_options.frequency = self.add_options.frequency.next();
            }
            KeyCode::Backspace => {
                self.add_dialog.input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.add_dialog.input.push(c);
            }
            _ => {}
        }
    }

    fn handle_bulk_input(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Esc => {
                self.close_overlay();
            }
            KeyCode::Enter => {
                self.submit_bulk_import();
            }
            KeyCode::Tab => {
                self.add_options.library = self.add_options.library.next();
            }
            KeyCode::BackTab => {
                self.add_options.frequency = self.add_options.frequency.next();
            }
            KeyCode::Backspace => {
                self.bulk_input.pop();
            }
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.bulk_input.push(c);
            }
            _ => {}
        }
    }

    fn handle_duplicate_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('m') | KeyCode::Char('M') => {
                self.resolve_duplicate(DuplicateChoice::Merge);
            }
            KeyCode::Char('n') | KeyCode::Char('N') => {
                self.resolve_duplicate(DuplicateChoice::CreateNew);
            }
            KeyCode::Esc => {
                if let Some(pending) = self.pending_adds.pop_front() {
                    self.set_status(format!("Skipped {}", pending.title));
                }
                self.close_overlay();
                self.show_pending_duplicate();
            }
            _ => {}
        }
    }

    fn resolve_duplicate(&mut self, choice: DuplicateChoice) {
        if let Some((request, label)) = self.answer_duplicate(choice) {
            self.queue_download(request, label);
        }
        self.close_overlay();
        self.show_pending_duplicate();
    }

    /// Take the oldest pending add and build the request the answer asks for
    pub fn answer_duplicate(&mut self, choice: DuplicateChoice) -> Option<(DownloadRequest, String)> {
        let pending = self.pending_adds.pop_front()?;

        let answer = match choice {
            DuplicateChoice::Merge => {
                let label = format!("Merged into {}", pending.existing.series_folder_name);
                (DownloadRequest::merge_into(&pending.existing, pending.urls), label)
            }
            DuplicateChoice::CreateNew => {
                let label = format!("Created {}", pending.title);
                (self.new_series_request(Some(pending.title), pending.urls), label)
            }
        };
        Some(answer)
    }

    /// Open the duplicate prompt for the oldest pending add, unless the user
    /// is typing somewhere or already looking at a dialog
    fn show_pending_duplicate(&mut self) {
        if self.pending_adds.is_empty() {
            return;
        }
        if matches!(self.view, View::Library | View::Details | View::Jobs) {
            self.open_overlay(View::DuplicatePrompt);
        }
    }

    fn handle_confirm_remove_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Enter | KeyCode::Char('y') => {
                if let Some(target) = self.remove_target.take() {
                    self.remove(target);
                }
                self.close_overlay();
            }
            KeyCode::Esc | KeyCode::Char('n') => {
                self.remove_target = None;
                self.close_overlay();
            }
            _ => {}
        }
    }

    fn handle_help_input(&mut self, key: KeyCode) {
        match key {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?') => {
                self.toggle_help();
            }
            _ => {}
        }
    }

    fn move_selection_down(&mut self, view: View) {
        let sources_len = self.selected_series().map(|s| s.series_urls.len()).unwrap_or(0);
        let (state, len) = match view {
            View::Library => (&mut self.library_state, self.series.len()),
            View::Details => (&mut self.sources_state, sources_len),
            View::Search => (&mut self.search_state, self.search_results.len()),
            _ => return,
        };

        if len == 0 {
            return;
        }

        let next = match state.selected() {
            Some(i) => (i + 1).min(len - 1),
            None => 0,
        };
        state.select(Some(next));
    }

    fn move_selection_up(&mut self, view: View) {
        let sources_len = self.selected_series().map(|s| s.series_urls.len()).unwrap_or(0);
        let (state, len) = match view {
            View::Library => (&mut self.library_state, self.series.len()),
            View::Details => (&mut self.sources_state, sources_len),
            View::Search => (&mut self.search_state, self.search_results.len()),
            _ => return,
        };

        if len > 0 {
            let i = match state.selected() {
                Some(0) => len - 1,
                Some(i) => i - 1,
                None => 0,
            };
            state.select(Some(i));
        }
    }

    fn clamp_library_selection(&mut self) {
        if self.series.is_empty() {
            self.library_state.select(None);
        } else {
            let idx = self.library_state.selected().unwrap_or(0);
            self.library_state.select(Some(idx.min(self.series.len() - 1)));
        }
    }

    fn clamp_sources_selection(&mut self) {
        let len = self.selected_series().map(|s| s.series_urls.len()).unwrap_or(0);
        if len == 0 {
            self.sources_state.select(None);
        } else {
            let idx = self.sources_state.selected().unwrap_or(0);
            self.sources_state.select(Some(idx.min(len - 1)));
        }
    }

    pub fn highlighted_series(&self) -> Option<&WatchedSeries> {
        self.library_state.selected().and_then(|i| self.series.get(i))
    }

    pub fn selected_series(&self) -> Option<&WatchedSeries> {
        let folder = self.selected_folder.as_deref()?;
        watchlist::find_by_folder(&self.series, folder)
    }

    fn open_details(&mut self) {
        let Some(series) = self.highlighted_series() else {
            return;
        };
        let folder = series.series_folder_name.clone();
        let library = series.library;

        self.selected_folder = Some(folder.clone());
        self.details_metadata = None;
        self.sources_state = ListState::default();
        self.clamp_sources_selection();
        self.view = View::Details;

        let client = self.client.clone();
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            match client.series_metadata(&folder, library).await {
                Ok(metadata) => {
                    let _ = tx.send(AppMessage::MetadataLoaded(folder, metadata));
                }
                Err(e) => {
                    // Not written until the first discovery run finishes
                    debug!(series = %folder, error = %e, "No metadata available");
                }
            }
        });
    }

    fn close_details(&mut self) {
        self.selected_folder = None;
        self.details_metadata = None;
        self.sources_state = ListState::default();
    }

    fn open_jobs(&mut self) {
        self.view = View::Jobs;
        self.start_job_poller();
    }

    fn start_job_poller(&mut self) {
        let interval = Duration::from_secs(self.config.jobs.poll_interval_secs);
        let tx = self.msg_tx.clone();
        let panel = self.jobs.get_or_insert_with(JobsPanel::new);
        panel.start(self.client.clone(), interval, move |update| {
            tx.send(AppMessage::Jobs(update)).is_ok()
        });
    }

    fn close_jobs(&mut self) {
        // Dropping the panel aborts its poller
        self.jobs = None;
    }

    fn open_overlay(&mut self, overlay: View) {
        if !self.view.is_overlay() {
            self.previous_view = self.view;
        }
        self.view = overlay;
    }

    fn close_overlay(&mut self) {
        self.view = self.previous_view;
    }

    fn toggle_help(&mut self) {
        if self.view == View::Help {
            self.close_overlay();
        } else {
            self.open_overlay(View::Help);
        }
    }

    fn open_add_dialog(&mut self, target: AddTarget) {
        self.add_dialog = AddDialogState {
            target,
            input: String::new(),
        };
        self.open_overlay(View::AddUrl);
    }

    fn open_confirm_remove(&mut self, target: RemoveTarget) {
        self.remove_target = Some(target);
        self.open_overlay(View::ConfirmRemove);
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: false,
        });
    }

    fn set_error(&mut self, text: impl Into<String>) {
        self.status = Some(StatusLine {
            text: text.into(),
            is_error: true,
        });
    }

    /// Run a backend call in the background and report back as a message
    fn spawn_request<T, Fut, F>(&self, kind: RequestKind, request: Fut, on_ok: F)
    where
        T: Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        F: FnOnce(T) -> AppMessage + Send + 'static,
    {
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let msg = match request.await {
                Ok(value) => on_ok(value),
                Err(e) => AppMessage::ActionError {
                    kind,
                    message: e.to_string(),
                },
            };
            let _ = tx.send(msg);
        });
    }

    fn refresh_watched(&mut self) {
        self.series_loading = true;
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Watched,
            async move { client.watched().await },
            AppMessage::WatchedLoaded,
        );
    }

    fn load_sites(&self) {
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Action,
            async move { client.sites().await },
            AppMessage::SitesLoaded,
        );
    }

    fn current_site(&self) -> Option<&str> {
        self.site_filter
            .and_then(|i| self.sites.get(i))
            .map(String::as_str)
    }

    fn cycle_site(&mut self) {
        self.site_filter = match self.site_filter {
            None if !self.sites.is_empty() => Some(0),
            Some(i) if i + 1 < self.sites.len() => Some(i + 1),
            _ => None,
        };
        self.clear_search_results();
    }

    fn clear_search_results(&mut self) {
        self.search_results.clear();
        self.search_state.select(None);
    }

    fn perform_search(&mut self) {
        if self.search_query.trim().is_empty() || self.search_loading {
            return;
        }

        self.search_loading = true;
        self.search_results.clear();

        let query = self.search_query.clone();
        let site = self.current_site().map(str::to_string);
        let limit = self.config.general.search_limit;
        let client = self.client.clone();

        let answered_query = query.clone();
        let answered_site = site.clone();
        self.spawn_request(
            RequestKind::Search,
            async move { client.search(&query, site.as_deref(), limit).await },
            move |results| AppMessage::SearchResults {
                query: answered_query,
                site: answered_site,
                results,
            },
        );
    }

    fn add_selected_result(&mut self) {
        let Some(result) = self
            .search_state
            .selected()
            .and_then(|i| self.search_results.get(i))
            .cloned()
        else {
            return;
        };

        info!(title = %result.title, site = %result.site, "Adding search result");
        self.handle_add_candidate(result.title, vec![result.source_url]);

        // The user asked for this add, so the prompt may cover the search box
        if !self.pending_adds.is_empty() {
            self.open_overlay(View::DuplicatePrompt);
        }
    }

    fn submit_add_dialog(&mut self) {
        let url = self.add_dialog.input.trim().to_string();
        if url.is_empty() {
            return;
        }
        let target = self.add_dialog.target.clone();
        self.close_overlay();

        match target {
            AddTarget::Source(folder) => {
                let client = self.client.clone();
                let label = format!("Source added to {}", folder);
                self.spawn_request(
                    RequestKind::Action,
                    async move { client.add_source(&folder, &url).await },
                    move |_| AppMessage::ActionDone(label),
                );
            }
            AddTarget::NewSeries => {
                self.set_status(format!("Looking up {}...", url));
                let client = self.client.clone();
                let tx = self.msg_tx.clone();
                tokio::spawn(async move {
                    let title = match client.title_from_url(&url).await {
                        Ok(title) => Some(title),
                        Err(e) => {
                            // The backend falls back to a name derived from the URL
                            warn!(url = %url, error = %e, "Could not resolve title");
                            None
                        }
                    };
                    let _ = tx.send(AppMessage::TitleResolved {
                        title,
                        urls: vec![url],
                    });
                });
            }
        }
    }

    fn submit_bulk_import(&mut self) {
        let path = bulk::expand_home(&self.bulk_input);
        self.close_overlay();

        let urls = match bulk::load_csv(&path) {
            Ok(urls) => urls,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Bulk import failed");
                self.set_error(format!("{}: {}", path.display(), e));
                return;
            }
        };

        let request = BulkAddRequest {
            urls,
            library: self.add_options.library,
            frequency: self.add_options.frequency,
        };
        let label = format!("Bulk import of {} URLs started", request.urls.len());
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Action,
            async move { client.bulk_add(&request).await },
            move |_| AppMessage::ActionDone(label),
        );
    }

    /// Route a title through the duplicate check before anything is created
    pub fn handle_add_candidate(&mut self, title: String, urls: Vec<String>) {
        let threshold = self.config.matcher.threshold;

        match watchlist::plan_add(&title, &self.series, threshold) {
            AddPlan::Merge(existing) => {
                let label = format!("Added source to {}", existing.series_folder_name);
                let request = DownloadRequest::merge_into(existing, urls);
                self.queue_download(request, label);
            }
            AddPlan::Ambiguous(existing) => {
                let existing = existing.clone();
                info!(title = %title, existing = %existing.series_folder_name, "Possible duplicate");
                self.set_status(format!(
                    "{} looks like {}, waiting for your answer",
                    title, existing.series_folder_name
                ));
                self.pending_adds.push_back(PendingAdd {
                    title,
                    urls,
                    existing,
                });
            }
            AddPlan::Create => {
                let label = format!("Created {}", title);
                let request = self.new_series_request(Some(title), urls);
                self.queue_download(request, label);
            }
        }
    }

    fn new_series_request(&self, title: Option<String>, urls: Vec<String>) -> DownloadRequest {
        DownloadRequest::create_new(
            title,
            urls,
            self.add_options.library,
            self.add_options.frequency,
            self.add_options.use_flaresolverr,
        )
    }

    fn queue_download(&self, request: DownloadRequest, label: String) {
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Action,
            async move { client.download(&request).await },
            move |ticket| AppMessage::JobQueued(label, ticket),
        );
    }

    fn redownload(&mut self, series: &WatchedSeries) {
        if series.series_urls.is_empty() {
            self.set_error(format!("{} has no sources", series.series_folder_name));
            return;
        }
        let label = format!("Re-download queued for {}", series.series_folder_name);
        self.queue_download(DownloadRequest::redownload(series), label);
    }

    fn refresh_cover(&mut self, series: &WatchedSeries) {
        let Some(request) = RefreshImageRequest::for_series(series) else {
            self.set_error(format!("{} has no sources", series.series_folder_name));
            return;
        };
        let label = format!("Cover refresh queued for {}", series.series_folder_name);
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Action,
            async move { client.refresh_image(&request).await },
            move |ticket| AppMessage::JobQueued(label, ticket),
        );
    }

    fn refresh_metadata(&mut self, series: &WatchedSeries) {
        let request = RefreshMetadataRequest::for_series(series);
        let label = format!("Metadata refresh queued for {}", series.series_folder_name);
        let client = self.client.clone();
        self.spawn_request(
            RequestKind::Action,
            async move { client.refresh_metadata(&request).await },
            move |ticket| AppMessage::JobQueued(label, ticket),
        );
    }

    fn remove(&mut self, target: RemoveTarget) {
        let client = self.client.clone();
        match target {
            RemoveTarget::Series(folder) => {
                info!(series = %folder, "Removing series");
                if self.selected_folder.as_deref() == Some(folder.as_str()) {
                    self.close_details();
                    self.previous_view = View::Library;
                }
                self.spawn_request(
                    RequestKind::Action,
                    async move { client.remove_series(&folder).await },
                    AppMessage::ActionDone,
                );
            }
            RemoveTarget::Source { folder, url } => {
                info!(series = %folder, url = %url, "Removing source");
                self.spawn_request(
                    RequestKind::Action,
                    async move { client.remove_source(&folder, &url).await },
                    AppMessage::ActionDone,
                );
            }
        }
    }

    fn cleanup(&mut self) {
        self.close_jobs();
        info!("Shutting down");
    }

    fn render_add_dialog(&self, frame: &mut Frame) {
        use ratatui::style::Style;
        use ratatui::widgets::{Block, Borders, Clear, Paragraph};

        let dialog_area = widgets::centered_rect(frame.area(), 70, 9);
        frame.render_widget(Clear, dialog_area);

        let title = match &self.add_dialog.target {
            AddTarget::NewSeries => " Add Series by URL ".to_string(),
            AddTarget::Source(folder) => format!(" Add Source to {} ", folder),
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.accent));

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let layout = Layout::default()
            .constraints([
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Min(1),
            ])
            .split(inner);

        frame.render_widget(
            Paragraph::new("Paste a series page URL from a supported site")
                .style(Style::default().fg(Color::Cyan)),
            layout[0],
        );
        frame.render_widget(
            Paragraph::new(format!("> {}", self.add_dialog.input))
                .style(Style::default().fg(Color::White))
                .block(Block::default().borders(Borders::BOTTOM)),
            layout[1],
        );

        if self.add_dialog.target == AddTarget::NewSeries {
            self.render_add_options(frame, layout[2]);
        }
    }

    fn render_add_options(&self, frame: &mut Frame, area: ratatui::layout::Rect) {
        use ratatui::style::Style;
        use ratatui::widgets::Paragraph;

        let summary = format!(
            "Library: {}   Checked: {}",
            self.add_options.library,
            self.add_options.frequency.as_display()
        );
        frame.render_widget(
            Paragraph::new(summary).style(Style::default().fg(Color::DarkGray)),
            area,
        );
    }

    fn render_bulk_dialog(&self, frame: &mut Frame) {
        use ratatui::style::Style;
        use ratatui::widgets::{Block, Borders, Clear, Paragraph};

        let dialog_area = widgets::centered_rect(frame.area(), 70, 9);
        frame.render_widget(Clear, dialog_area);

        let block = Block::default()
            .title(" Bulk Import from CSV ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.accent));

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let layout = Layout::default()
            .constraints([
                Constraint::Length(2),
                Constraint::Length(2),
                Constraint::Min(1),
            ])
            .split(inner);

        frame.render_widget(
            Paragraph::new("Path to a CSV file; every http(s) URL in it is imported")
                .style(Style::default().fg(Color::Cyan)),
            layout[0],
        );
        frame.render_widget(
            Paragraph::new(format!("> {}", self.bulk_input))
                .style(Style::default().fg(Color::White))
                .block(Block::default().borders(Borders::BOTTOM)),
            layout[1],
        );
        self.render_add_options(frame, layout[2]);
    }

    fn render_duplicate_prompt(&self, frame: &mut Frame) {
        use ratatui::layout::Alignment;
        use ratatui::style::{Modifier, Style};
        use ratatui::text::{Line, Span, Text};
        use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

        let Some(pending) = self.pending_adds.front() else {
            return;
        };

        let dialog_area = widgets::centered_rect(frame.area(), 64, 10);
        frame.render_widget(Clear, dialog_area);

        let title = match self.pending_adds.len() {
            1 => " Possible Duplicate ".to_string(),
            n => format!(" Possible Duplicate (1 of {}) ", n),
        };
        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow));

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let bold = Style::default().add_modifier(Modifier::BOLD);
        let text = Text::from(vec![
            Line::from(vec![Span::raw("New: "), Span::styled(pending.title.as_str(), bold)]),
            Line::from(vec![
                Span::raw("Looks like: "),
                Span::styled(pending.existing.series_folder_name.as_str(), bold.fg(Color::Yellow)),
            ]),
            Line::from(""),
            Line::from("m: add as a source of the existing series"),
            Line::from("n: create a separate series"),
        ]);

        frame.render_widget(
            Paragraph::new(text)
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            inner,
        );
    }

    fn render_confirm_remove(&self, frame: &mut Frame) {
        use ratatui::layout::Alignment;
        use ratatui::style::{Modifier, Style};
        use ratatui::text::{Line, Span, Text};
        use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

        let Some(target) = &self.remove_target else {
            return;
        };

        let dialog_area = widgets::centered_rect(frame.area(), 60, 8);
        frame.render_widget(Clear, dialog_area);

        let block = Block::default()
            .title(" Confirm Removal ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Red));

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let red = Style::default().add_modifier(Modifier::BOLD).fg(Color::Red);
        let lines = match target {
            RemoveTarget::Series(folder) => vec![
                Line::from("Stop watching this series?"),
                Line::from(Span::styled(folder.as_str(), red)),
                Line::from(""),
                Line::from("Downloaded chapters stay on disk."),
            ],
            RemoveTarget::Source { folder, url } => vec![
                Line::from(format!("Remove this source from {}?", folder)),
                Line::from(Span::styled(url.as_str(), red)),
                Line::from(""),
                Line::from("Removing the last source stops watching the series."),
            ],
        };

        frame.render_widget(
            Paragraph::new(Text::from(lines))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true }),
            inner,
        );
    }

    fn render_help(&self, frame: &mut Frame) {
        use ratatui::style::{Modifier, Style};
        use ratatui::widgets::{Block, Borders, Clear, Row, Table};

        let dialog_area = widgets::centered_rect(frame.area(), 72, 26);
        frame.render_widget(Clear, dialog_area);

        let block = Block::default()
            .title(" Help ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(self.accent));

        let inner = block.inner(dialog_area);
        frame.render_widget(block, dialog_area);

        let rows = vec![
            Row::new(vec!["Global", "?", "Toggle Help"]),
            Row::new(vec!["", "q", "Quit"]),
            Row::new(vec!["Library", "j/k", "Navigate"]),
            Row::new(vec!["", "Enter/l", "Series Details"]),
            Row::new(vec!["", "/", "Search Sources"]),
            Row::new(vec!["", "a", "Add Series by URL"]),
            Row::new(vec!["", "b", "Bulk Import CSV"]),
            Row::new(vec!["", "r", "Re-download"]),
            Row::new(vec!["", "x", "Remove Series"]),
            Row::new(vec!["", "R", "Reload List"]),
            Row::new(vec!["", "J", "Job Status"]),
            Row::new(vec!["Details", "j/k", "Select Source"]),
            Row::new(vec!["", "a", "Add Source"]),
            Row::new(vec!["", "x / X", "Remove Source / Series"]),
            Row::new(vec!["", "c / m", "Refresh Cover / Metadata"]),
            Row::new(vec!["Search", "Enter", "Search, then Add"]),
            Row::new(vec!["", "Ctrl+s", "Cycle Site"]),
            Row::new(vec!["Dialogs", "Tab", "Cycle Library"]),
            Row::new(vec!["", "Shift+Tab", "Cycle Frequency"]),
        ];

        let table = Table::new(
            rows,
            &[
                Constraint::Percentage(20),
                Constraint::Percentage(20),
                Constraint::Percentage(60),
            ],
        )
        .header(
            Row::new(vec!["Context", "Key", "Action"]).style(
                Style::default()
                    .add_modifier(Modifier::BOLD)
                    .fg(self.accent),
            ),
        )
        .block(Block::default().borders(Borders::NONE));

        frame.render_widget(table, inner);
    }
}

pub fn init_terminal() -> io::Result<DefaultTerminal> {
    crossterm::terminal::enable_raw_mode()?;
    crossterm::execute!(io::stdout(), crossterm::terminal::EnterAlternateScreen)?;
    Ok(ratatui::init())
}

pub fn restore_terminal() -> io::Result<()> {
    ratatui::restore();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(folder: &str) -> WatchedSeries {
        WatchedSeries {
            series_folder_name: folder.to_string(),
            series_urls: vec![format!("https://site.example/{}", folder)],
            library: Library::Manga,
            use_flaresolverr: true,
            frequency: Frequency::Daily,
            display_site_name: "Site".to_string(),
            missing_chapters_count: 0,
            missing_chapters_list: Vec::new(),
        }
    }

    fn app_with(series_list: Vec<WatchedSeries>) -> App {
        let mut config = Config::default();
        // Nothing listens here; spawned requests fail fast and are ignored
        config.backend.base_url = "http://127.0.0.1:9".to_string();
        config.backend.request_timeout_secs = 1;

        let mut app = App::new(config).unwrap();
        app.handle_message(AppMessage::WatchedLoaded(series_list));
        app
    }

    fn type_into_add_dialog(app: &mut App, text: &str) {
        for c in text.chars() {
            app.handle_add_input(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
        }
    }

    fn result(title: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            cover_url: None,
            source_url: format!("https://site.example/{}", title),
            site: "Site".to_string(),
            author: None,
            status: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_similar_title_opens_prompt() {
        let mut app = app_with(vec![series("Solo Leveling"), series("one-piece")]);

        app.handle_add_candidate("One Piece".into(), vec!["https://new.example/op".into()]);
        app.process_messages();

        assert_eq!(app.view, View::DuplicatePrompt);
        assert_eq!(app.previous_view, View::Library);
        let pending = app.pending_adds.front().unwrap();
        assert_eq!(pending.existing.series_folder_name, "one-piece");
        assert_eq!(pending.urls, vec!["https://new.example/op".to_string()]);
    }

    #[tokio::test]
    async fn test_unrelated_title_skips_prompt() {
        let mut app = app_with(vec![series("Solo Leveling")]);

        app.handle_add_candidate("Blue Lock".into(), vec!["https://new.example/bl".into()]);
        app.process_messages();

        assert_eq!(app.view, View::Library);
        assert!(app.pending_adds.is_empty());
    }

    #[tokio::test]
    async fn test_resolved_title_waits_while_typing() {
        let mut app = app_with(vec![series("one-piece")]);
        app.open_add_dialog(AddTarget::NewSeries);
        type_into_add_dialog(&mut app, "https://");

        app.handle_message(AppMessage::TitleResolved {
            title: Some("One Piece".into()),
            urls: vec!["https://new.example/op".into()],
        });
        app.process_messages();

        assert_eq!(app.view, View::AddUrl);
        assert_eq!(app.add_dialog.input, "https://");
        assert_eq!(app.pending_adds.len(), 1);

        // 'm' is just text here, not a merge answer
        type_into_add_dialog(&mut app, "m");
        assert_eq!(app.add_dialog.input, "https://m");
        assert_eq!(app.pending_adds.len(), 1);

        app.handle_add_input(KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE));
        app.process_messages();
        assert_eq!(app.view, View::DuplicatePrompt);
    }

    #[tokio::test]
    async fn test_resolved_title_waits_while_searching() {
        let mut app = app_with(vec![series("one-piece")]);
        app.handle_library_input(KeyCode::Char('/'));

        app.handle_message(AppMessage::TitleResolved {
            title: Some("One Piece".into()),
            urls: vec!["https://new.example/op".into()],
        });
        app.process_messages();

        assert_eq!(app.view, View::Search);
        assert_eq!(app.pending_adds.len(), 1);
    }

    #[tokio::test]
    async fn test_second_duplicate_waits_its_turn() {
        let mut app = app_with(vec![series("one-piece"), series("naruto")]);

        app.handle_add_candidate("One Piece".into(), vec!["https://a.example/op".into()]);
        app.handle_add_candidate("Naruto!".into(), vec!["https://a.example/nar".into()]);
        app.process_messages();

        assert_eq!(app.view, View::DuplicatePrompt);
        assert_eq!(app.pending_adds.len(), 2);
        assert_eq!(app.pending_adds.front().unwrap().title, "One Piece");

        app.handle_duplicate_input(KeyCode::Char('n'));
        assert_eq!(app.view, View::DuplicatePrompt);
        assert_eq!(app.pending_adds.len(), 1);
        assert_eq!(app.pending_adds.front().unwrap().title, "Naruto!");

        app.handle_duplicate_input(KeyCode::Esc);
        assert!(app.pending_adds.is_empty());
        assert_eq!(app.view, View::Library);
        assert_eq!(app.status.as_ref().unwrap().text, "Skipped Naruto!");
    }

    #[tokio::test]
    async fn test_merge_answer_keeps_existing_series_settings() {
        let mut app = app_with(vec![series("one-piece")]);
        app.add_options = AddOptions {
            library: Library::Comics,
            frequency: Frequency::Weekly,
            use_flaresolverr: false,
        };
        let urls = vec!["https://new.example/op".to_string()];
        app.handle_add_candidate("One Piece".into(), urls.clone());

        let (request, label) = app.answer_duplicate(DuplicateChoice::Merge).unwrap();

        assert_eq!(request, DownloadRequest::merge_into(&series("one-piece"), urls.clone()));
        assert_eq!(request.series_folder_name.as_deref(), Some("one-piece"));
        assert_eq!(request.library, Library::Manga);
        assert_eq!(request.frequency, Frequency::Daily);
        assert!(request.use_flaresolverr);
        assert_eq!(request.source_urls, urls);
        assert_eq!(label, "Merged into one-piece");
        assert!(app.pending_adds.is_empty());
    }

    #[tokio::test]
    async fn test_create_answer_uses_session_options() {
        let mut app = app_with(vec![series("one-piece")]);
        app.add_options = AddOptions {
            library: Library::Comics,
            frequency: Frequency::Weekly,
            use_flaresolverr: false,
        };
        let urls = vec!["https://new.example/op".to_string()];
        app.handle_add_candidate("One Piece".into(), urls.clone());

        let (request, label) = app.answer_duplicate(DuplicateChoice::CreateNew).unwrap();

        assert_eq!(
            request,
            DownloadRequest::create_new(
                Some("One Piece".into()),
                urls,
                Library::Comics,
                Frequency::Weekly,
                false,
            )
        );
        assert_eq!(request.series_folder_name, None);
        assert_eq!(request.title.as_deref(), Some("One Piece"));
        assert_eq!(label, "Created One Piece");
        assert!(app.answer_duplicate(DuplicateChoice::CreateNew).is_none());
    }

    #[tokio::test]
    async fn test_watched_reload_clamps_selection() {
        let mut app = app_with(vec![series("A"), series("B"), series("C")]);
        app.library_state.select(Some(2));

        app.handle_message(AppMessage::WatchedLoaded(vec![series("A")]));
        assert_eq!(app.library_state.selected(), Some(0));

        app.handle_message(AppMessage::WatchedLoaded(Vec::new()));
        assert_eq!(app.library_state.selected(), None);
    }

    #[tokio::test]
    async fn test_details_closes_when_series_disappears() {
        let mut app = app_with(vec![series("A"), series("B")]);
        app.library_state.select(Some(1));
        app.open_details();
        assert_eq!(app.view, View::Details);
        assert_eq!(app.selected_series().unwrap().series_folder_name, "B");

        app.handle_message(AppMessage::WatchedLoaded(vec![series("A")]));
        assert_eq!(app.view, View::Library);
        assert!(app.selected_folder.is_none());
    }

    #[tokio::test]
    async fn test_metadata_for_other_series_ignored() {
        let mut app = app_with(vec![series("A")]);
        app.library_state.select(Some(0));
        app.open_details();

        let meta = SeriesMetadata {
            name: "Other".into(),
            ..SeriesMetadata::default()
        };
        app.handle_message(AppMessage::MetadataLoaded("B".into(), meta.clone()));
        assert!(app.details_metadata.is_none());

        app.handle_message(AppMessage::MetadataLoaded("A".into(), meta));
        assert!(app.details_metadata.is_some());
    }

    #[tokio::test]
    async fn test_jobs_panel_lives_with_view() {
        let mut app = app_with(Vec::new());

        app.open_jobs();
        assert_eq!(app.view, View::Jobs);
        assert!(app.jobs.as_ref().is_some_and(|p| p.is_polling()));

        app.handle_jobs_input(KeyCode::Esc);
        assert_eq!(app.view, View::Library);
        assert!(app.jobs.is_none());
    }

    #[tokio::test]
    async fn test_site_filter_cycles_back_to_all() {
        let mut app = app_with(Vec::new());
        app.handle_message(AppMessage::SitesLoaded(vec!["MangaDex".into(), "Asura".into()]));

        app.cycle_site();
        assert_eq!(app.current_site(), Some("MangaDex"));
        app.cycle_site();
        assert_eq!(app.current_site(), Some("Asura"));
        app.cycle_site();
        assert_eq!(app.current_site(), None);
    }

    #[tokio::test]
    async fn test_outdated_search_results_dropped() {
        let mut app = app_with(Vec::new());
        app.view = View::Search;
        app.search_query = "blame".into();
        app.search_loading = true;

        app.handle_message(AppMessage::SearchResults {
            query: "berserk".into(),
            site: None,
            results: vec![result("Berserk")],
        });
        assert!(!app.search_loading);
        assert!(app.search_results.is_empty());
        assert_eq!(app.search_state.selected(), None);

        app.handle_message(AppMessage::SearchResults {
            query: "blame".into(),
            site: None,
            results: vec![result("Blame!")],
        });
        assert_eq!(app.search_results.len(), 1);
        assert_eq!(app.search_state.selected(), Some(0));
    }

    #[tokio::test]
    async fn test_results_for_other_site_dropped() {
        let mut app = app_with(Vec::new());
        app.handle_message(AppMessage::SitesLoaded(vec!["MangaDex".into()]));
        app.search_query = "blame".into();
        app.cycle_site();

        app.handle_message(AppMessage::SearchResults {
            query: "blame".into(),
            site: None,
            results: vec![result("Blame!")],
        });
        assert!(app.search_results.is_empty());
    }

    #[tokio::test]
    async fn test_error_resets_only_its_own_loading_flag() {
        let mut app = app_with(Vec::new());
        app.search_loading = true;
        app.series_loading = true;

        app.handle_message(AppMessage::ActionError {
            kind: RequestKind::Action,
            message: "Backend returned 404: gone".into(),
        });
        assert!(app.search_loading);
        assert!(app.series_loading);

        app.handle_message(AppMessage::ActionError {
            kind: RequestKind::Search,
            message: "Backend returned 500: boom".into(),
        });
        assert!(!app.search_loading);
        assert!(app.series_loading);

        let status = app.status.as_ref().unwrap();
        assert!(status.is_error);
        assert!(status.text.contains("boom"));

        app.handle_message(AppMessage::ActionError {
            kind: RequestKind::Watched,
            message: "Network error".into(),
        });
        assert!(!app.series_loading);
    }
}
