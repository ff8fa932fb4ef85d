use image::DynamicImage;
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
};
use ratatui_image::{Resize, StatefulImage, picker::Picker, protocol::StatefulProtocol};
use std::time::Instant;

use crate::backend::mangadex::{ChapterPage, MangaDetail, MangaSummary};
use crate::error::Result;
use crate::navigation::{Fetch, Route, Screen, Session, Ticket, Transition};

#[derive(Default)]
pub struct ReaderState {
    pub page_urls: Vec<String>,
    pub current_page: usize,
    pub resolving: bool,
    pub page_loaded: bool,
    pub image_state: Option<StatefulProtocol>,
}

impl ReaderState {
    fn reset(&mut self) {
        *self = ReaderState::default();
    }
}

pub struct App {
    pub session: Session,
    pub search_input: String,
    pub search_debounce: Option<Instant>,
    pub searching: bool,
    pub search_results: Vec<MangaSummary>,
    pub search_list_state: ListState,
    pub detail: Option<MangaDetail>,
    pub show_description: bool,
    pub chapters_loading: bool,
    pub chapter_page: Option<ChapterPage>,
    pub chapter_list_state: ListState,
    pub reader: ReaderState,
    pub status: Option<String>,
    pub picker: Option<Picker>,
    shown_manga_id: Option<String>,
    shown_chapter_id: Option<String>,
}

impl App {
    pub fn new(page_size: usize) -> Self {
        Self::with_picker(page_size, Picker::from_query_stdio().ok())
    }

    pub fn with_picker(page_size: usize, picker: Option<Picker>) -> Self {
        Self {
            session: Session::new(page_size),
            search_input: String::new(),
            search_debounce: None,
            searching: false,
            search_results: Vec::new(),
            search_list_state: ListState::default(),
            detail: None,
            show_description: false,
            chapters_loading: false,
            chapter_page: None,
            chapter_list_state: ListState::default(),
            reader: ReaderState::default(),
            status: None,
            picker,
            shown_manga_id: None,
            shown_chapter_id: None,
        }
    }

    pub fn screen(&self) -> Screen {
        self.session.screen()
    }

    fn apply_transition(&mut self, transition: Transition) -> Vec<Fetch> {
        self.status = None;
        if transition.redirected {
            log::debug!("landed on {} after redirect", transition.screen.path());
        }
        match transition.screen {
            Screen::Browsing => {
                self.searching = true;
            }
            Screen::ChapterBrowsing => {
                let manga_id = self.session.current_manga_id().map(str::to_string);
                if manga_id != self.shown_manga_id {
                    self.detail = None;
                    self.chapter_page = None;
                    self.show_description = false;
                    self.chapter_list_state.select(None);
                    self.shown_manga_id = manga_id;
                }
                self.chapters_loading = true;
            }
            Screen::Reading => {
                let chapter_id = self.session.current_chapter_id().map(str::to_string);
                if chapter_id != self.shown_chapter_id {
                    self.reader.reset();
                    self.shown_chapter_id = chapter_id;
                }
                self.reader.resolving = true;
            }
        }
        transition.fetches
    }

    pub fn enter(&mut self, route: Route) -> Vec<Fetch> {
        let transition = self.session.enter(route);
        self.apply_transition(transition)
    }

    pub fn go_back(&mut self) -> Vec<Fetch> {
        match self.screen() {
            Screen::Reading => self.enter(Route::Manga(None)),
            Screen::ChapterBrowsing => self.enter(Route::Root),
            Screen::Browsing => Vec::new(),
        }
    }

    pub fn reload(&mut self) -> Vec<Fetch> {
        let fetches = self.session.reload();
        match self.screen() {
            Screen::Browsing => self.searching = true,
            Screen::ChapterBrowsing => self.chapters_loading = true,
            Screen::Reading => self.reader.resolving = true,
        }
        fetches
    }

    pub fn search_now(&mut self) -> Fetch {
        self.search_debounce = None;
        self.searching = true;
        let query = self.search_input.clone();
        self.session.search(&query)
    }

    /// True when the typed query differs from the last one sent.
    pub fn search_pending(&self) -> bool {
        self.search_input != self.session.search_query()
    }

    pub fn open_selected_manga(&mut self) -> Vec<Fetch> {
        let Some(manga) = self
            .search_list_state
            .selected()
            .and_then(|i| self.search_results.get(i))
        else {
            return Vec::new();
        };
        let manga_id = manga.id.clone();
        let transition = self.session.select_manga(&manga_id);
        self.apply_transition(transition)
    }

    pub fn open_selected_chapter(&mut self) -> Vec<Fetch> {
        let Some(chapter) = self.selected_chapter_id() else {
            return Vec::new();
        };
        let transition = self.session.select_chapter(&chapter);
        self.apply_transition(transition)
    }

    fn selected_chapter_id(&self) -> Option<String> {
        let page = self.chapter_page.as_ref()?;
        let selected = self.chapter_list_state.selected()?;
        page.items.get(selected).map(|c| c.id.clone())
    }

    pub fn next_chapter_page(&mut self) -> Option<Fetch> {
        let page = self.chapter_page.as_ref()?;
        let fetch = self.session.next_chapter_page(page)?;
        self.chapters_loading = true;
        Some(fetch)
    }

    pub fn previous_chapter_page(&mut self) -> Option<Fetch> {
        let fetch = self.session.previous_chapter_page()?;
        self.chapters_loading = true;
        Some(fetch)
    }

    pub fn select_next_result(&mut self) {
        step_selection(&mut self.search_list_state, self.search_results.len(), true);
    }

    pub fn select_previous_result(&mut self) {
        step_selection(&mut self.search_list_state, self.search_results.len(), false);
    }

    pub fn select_next_chapter(&mut self) {
        let len = self.chapter_page.as_ref().map_or(0, |p| p.items.len());
        step_selection(&mut self.chapter_list_state, len, true);
    }

    pub fn select_previous_chapter(&mut self) {
        let len = self.chapter_page.as_ref().map_or(0, |p| p.items.len());
        step_selection(&mut self.chapter_list_state, len, false);
    }

    pub fn apply_search(&mut self, ticket: Ticket, result: Result<Vec<MangaSummary>>) -> bool {
        if !self.session.is_current(ticket) {
            log::debug!("dropping stale search result");
            return false;
        }
        self.searching = false;

        match result {
            Ok(results) => {
                self.search_list_state
                    .select(if results.is_empty() { None } else { Some(0) });
                self.search_results = results;
            }
            Err(e) => {
                log::warn!("search failed: {e}");
                self.status = Some(format!("Search failed: {e}"));
            }
        }
        true
    }

    pub fn apply_detail(&mut self, ticket: Ticket, result: Result<Option<MangaDetail>>) -> bool {
        if !self.session.is_current(ticket) {
            log::debug!("dropping stale manga detail");
            return false;
        }

        self.detail = match result {
            Ok(detail) => detail,
            Err(e) => {
                log::warn!("manga detail unavailable: {e}");
                None
            }
        };
        true
    }

    pub fn apply_chapters(
        &mut self,
        ticket: Ticket,
        offset: usize,
        result: Result<ChapterPage>,
    ) -> bool {
        if !self.session.is_current(ticket) {
            log::debug!("dropping stale chapter page at offset {offset}");
            return false;
        }
        self.chapters_loading = false;

        let page = match result {
            Ok(page) => page,
            Err(e) => {
                log::warn!("chapter feed failed: {e}");
                self.status = Some(format!("Could not load chapters: {e}"));
                ChapterPage::empty(offset)
            }
        };
        self.chapter_list_state
            .select(if page.items.is_empty() { None } else { Some(0) });
        self.chapter_page = Some(page);
        true
    }

    /// Stores the resolved page list and returns the fetch for the first page.
    pub fn apply_pages(&mut self, ticket: Ticket, result: Result<Vec<String>>) -> Option<Fetch> {
        if !self.session.is_current(ticket) {
            log::debug!("dropping stale page list");
            return None;
        }
        self.reader.resolving = false;
        self.reader.current_page = 0;
        self.reader.image_state = None;
        self.reader.page_loaded = false;

        self.reader.page_urls = match result {
            Ok(urls) => urls,
            Err(e) => {
                log::warn!("page resolution failed: {e}");
                self.status = Some(format!("Could not load chapter: {e}"));
                Vec::new()
            }
        };

        let url = self.reader.page_urls.first()?.clone();
        Some(self.session.page_image(&url))
    }

    pub fn apply_page_image(&mut self, ticket: Ticket, image: Option<DynamicImage>) -> bool {
        if !self.session.is_current(ticket) {
            return false;
        }

        match image {
            Some(image) => {
                self.reader.page_loaded = true;
                self.reader.image_state = self
                    .picker
                    .as_ref()
                    .map(|picker| picker.new_resize_protocol(image));
            }
            None => {
                self.status = Some(format!(
                    "Could not load page {}",
                    self.reader.current_page + 1
                ));
            }
        }
        true
    }

    pub fn current_page_url(&self) -> Option<&str> {
        self.reader
            .page_urls
            .get(self.reader.current_page)
            .map(String::as_str)
    }

    fn turn_page(&mut self, page: usize) -> Option<Fetch> {
        let url = self.reader.page_urls.get(page)?.clone();
        self.reader.current_page = page;
        self.reader.image_state = None;
        self.reader.page_loaded = false;
        self.status = None;
        Some(self.session.page_image(&url))
    }

    pub fn next_page(&mut self) -> Option<Fetch> {
        self.turn_page(self.reader.current_page + 1)
    }

    pub fn prev_page(&mut self) -> Option<Fetch> {
        let page = self.reader.current_page.checked_sub(1)?;
        self.turn_page(page)
    }
}

fn step_selection(state: &mut ListState, len: usize, forward: bool) {
    if len == 0 {
        state.select(None);
        return;
    }
    let next = match state.selected() {
        None => 0,
        Some(selected) if forward => (selected + 1).min(len - 1),
        Some(selected) => selected.saturating_sub(1),
    };
    state.select(Some(next));
}

pub fn ui(f: &mut Frame, app: &mut App) {
    let area = f.area();

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // header/tabs
            Constraint::Min(10),   // content
            Constraint::Length(1), // status
            Constraint::Length(3), // footer
        ])
        .split(area);

    draw_header(f, root[0], app.screen());

    match app.screen() {
        Screen::Browsing => draw_search(f, root[1], app),
        Screen::ChapterBrowsing => draw_chapters(f, root[1], app),
        Screen::Reading => draw_reader(f, root[1], app),
    }

    if let Some(status) = &app.status {
        let p = Paragraph::new(status.as_str()).style(Style::default().fg(Color::Red));
        f.render_widget(p, root[2]);
    }

    draw_footer(f, root[3], app.screen());
}

fn focused_style() -> Style {
    Style::default()
        .fg(Color::Yellow)
        .add_modifier(Modifier::BOLD)
}

fn draw_header(f: &mut Frame, area: Rect, screen: Screen) {
    let titles = vec!["Search", "Chapters", "Reader"];
    let selected = match screen {
        Screen::Browsing => 0,
        Screen::ChapterBrowsing => 1,
        Screen::Reading => 2,
    };

    let tabs = Tabs::new(titles)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title("MangaDex Reader")
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .select(selected)
        .style(Style::default().fg(Color::DarkGray))
        .highlight_style(focused_style());

    f.render_widget(tabs, area);
}

fn draw_search(f: &mut Frame, area: Rect, app: &mut App) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let input = Paragraph::new(Line::from(vec![
        Span::raw(app.search_input.as_str()),
        Span::styled("_", Style::default().fg(Color::Yellow)),
    ]))
    .block(
        Block::default()
            .borders(Borders::ALL)
            .title("Title")
            .border_style(focused_style()),
    );
    f.render_widget(input, layout[0]);

    let title = if app.searching {
        "Results (searching...)"
    } else {
        "Results"
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    if app.search_results.is_empty() {
        let message = if app.searching { "Searching..." } else { "No results" };
        let p = Paragraph::new(message)
            .block(block)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, layout[1]);
        return;
    }

    let items: Vec<ListItem> = app
        .search_results
        .iter()
        .map(|m| ListItem::new(m.title.as_str()))
        .collect();
    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, layout[1], &mut app.search_list_state);
}

fn draw_chapters(f: &mut Frame, area: Rect, app: &mut App) {
    let detail_height = if app.show_description { 10 } else { 4 };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(detail_height),
            Constraint::Length(1), // top page nav
            Constraint::Min(3),    // chapter list
            Constraint::Length(1), // bottom page nav
        ])
        .split(area);

    draw_detail(f, layout[0], app.detail.as_ref(), app.show_description);

    let nav = page_nav_line(
        app.session.chapter_offset(),
        app.session.page_size(),
        app.session.has_previous_chapter_page(),
        app.session.has_next_chapter_page(app.chapter_page.as_ref()),
    );
    f.render_widget(Paragraph::new(nav.clone()).alignment(Alignment::Center), layout[1]);
    f.render_widget(Paragraph::new(nav).alignment(Alignment::Center), layout[3]);

    let title = if app.chapters_loading {
        "Chapters (loading...)"
    } else {
        "Chapters"
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let items: Vec<ListItem> = app
        .chapter_page
        .as_ref()
        .map(|page| {
            page.items
                .iter()
                .map(|c| ListItem::new(c.display_line()))
                .collect()
        })
        .unwrap_or_default();

    if items.is_empty() {
        let message = if app.chapters_loading { "Loading..." } else { "No chapters" };
        let p = Paragraph::new(message)
            .block(block)
            .alignment(Alignment::Center)
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(p, layout[2]);
        return;
    }

    let list = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    f.render_stateful_widget(list, layout[2], &mut app.chapter_list_state);
}

fn draw_detail(f: &mut Frame, area: Rect, detail: Option<&MangaDetail>, expanded: bool) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    // Missing detail renders as an empty panel.
    let Some(detail) = detail else {
        f.render_widget(block, area);
        return;
    };

    let inner_width = area.width.saturating_sub(2) as usize;
    let mut lines = vec![Line::from(Span::styled(
        truncate_text(&detail.title, inner_width),
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    ))];

    if expanded {
        let max_lines = area.height.saturating_sub(3) as usize;
        for line in wrap_text(&detail.description, inner_width, max_lines) {
            lines.push(Line::from(Span::styled(line, Style::default().fg(Color::Gray))));
        }
    } else {
        lines.push(Line::from(Span::styled(
            "d: show full description",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let p = Paragraph::new(lines).block(block).wrap(Wrap { trim: true });
    f.render_widget(p, area);
}

fn page_nav_line(
    offset: usize,
    page_size: usize,
    has_previous: bool,
    has_next: bool,
) -> Line<'static> {
    let enabled = Style::default().fg(Color::Yellow);
    let disabled = Style::default().fg(Color::DarkGray);

    Line::from(vec![
        Span::styled("◀ Prev", if has_previous { enabled } else { disabled }),
        Span::raw(format!("   {}-{}   ", offset + 1, offset + page_size)),
        Span::styled("Next ▶", if has_next { enabled } else { disabled }),
    ])
}

fn draw_reader(f: &mut Frame, area: Rect, app: &mut App) {
    let total = app.reader.page_urls.len();
    let title = if total == 0 {
        "Reader".to_string()
    } else {
        format!("Page {}/{}", app.reader.current_page + 1, total)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(Style::default().fg(Color::Cyan));
    let inner = block.inner(area);
    f.render_widget(block, area);

    if let Some(state) = app.reader.image_state.as_mut() {
        let image_widget = StatefulImage::new().resize(Resize::Scale(None));
        f.render_stateful_widget(image_widget, inner, state);
        return;
    }

    let message = if app.reader.resolving {
        "Resolving pages..."
    } else if total == 0 {
        "No pages"
    } else if app.reader.page_loaded {
        "Image display unavailable in this terminal (o: open in browser)"
    } else {
        "Loading page..."
    };
    let p = Paragraph::new(message)
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray));
    f.render_widget(p, inner);
}

fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        format!(
            "{}...",
            text.chars()
                .take(max_len.saturating_sub(3))
                .collect::<String>()
        )
    }
}

fn wrap_text(text: &str, width: usize, max_lines: usize) -> Vec<String> {
    if width == 0 || max_lines == 0 {
        return vec![];
    }

    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.chars().count() + 1 + word.chars().count() <= width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            if lines.len() >= max_lines {
                if let Some(last) = lines.last_mut() {
                    let char_count = last.chars().count();
                    if char_count > 3 {
                        *last = last.chars().take(char_count - 3).collect::<String>() + "...";
                    }
                }
                return lines;
            }
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() && lines.len() < max_lines {
        lines.push(current_line);
    }

    lines
}

fn draw_footer(f: &mut Frame, area: Rect, screen: Screen) {
    let key = |k: &'static str| Span::styled(k, Style::default().fg(Color::Yellow));

    let spans = match screen {
        Screen::Browsing => vec![
            Span::raw("type to search  "),
            key("↑/↓"),
            Span::raw(": select  "),
            key("Enter"),
            Span::raw(": open  "),
            key("Esc"),
            Span::raw(": clear  "),
            key("Ctrl-C"),
            Span::raw(": quit"),
        ],
        Screen::ChapterBrowsing => vec![
            key("↑/↓"),
            Span::raw(": select  "),
            key("←/→"),
            Span::raw(": prev/next page  "),
            key("Enter"),
            Span::raw(": read  "),
            key("d"),
            Span::raw(": description  "),
            key("r"),
            Span::raw(": reload  "),
            key("Esc"),
            Span::raw(": back  "),
            key("q"),
            Span::raw(": quit"),
        ],
        Screen::Reading => vec![
            key("←/→"),
            Span::raw(": page  "),
            key("o"),
            Span::raw(": open in browser  "),
            key("r"),
            Span::raw(": reload  "),
            key("Esc"),
            Span::raw(": back  "),
            key("q"),
            Span::raw(": quit"),
        ],
    };

    let p = Paragraph::new(Line::from(spans))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .alignment(Alignment::Center);
    f.render_widget(p, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mangadex::ChapterSummary;
    use crate::error::Error;

    fn manga(id: &str) -> MangaSummary {
        MangaSummary {
            id: id.to_string(),
            title: format!("Title {id}"),
        }
    }

    fn page(offset: usize, ids: &[&str]) -> ChapterPage {
        ChapterPage {
            offset,
            items: ids
                .iter()
                .enumerate()
                .map(|(i, id)| ChapterSummary {
                    id: id.to_string(),
                    volume_label: "Vol. ?".into(),
                    chapter_label: format!("Ch. {i}"),
                    title: String::new(),
                    chapter_number: i as f64,
                })
                .collect(),
            returned_count: ids.len(),
        }
    }

    fn ticket(fetch: &Fetch) -> Ticket {
        match fetch {
            Fetch::Search { ticket, .. }
            | Fetch::Detail { ticket, .. }
            | Fetch::Chapters { ticket, .. }
            | Fetch::Pages { ticket, .. }
            | Fetch::PageImage { ticket, .. } => *ticket,
        }
    }

    fn app_with_results() -> App {
        let mut app = App::with_picker(25, None);
        let fetches = app.enter(Route::Root);
        app.apply_search(ticket(&fetches[0]), Ok(vec![manga("m1"), manga("m2")]));
        app
    }

    #[test]
    fn test_startup_searches_unfiltered() {
        let mut app = App::with_picker(25, None);
        let fetches = app.enter(Route::parse("/reader"));
        assert_eq!(app.screen(), Screen::Browsing);
        assert!(matches!(
            fetches.as_slice(),
            [Fetch::Search { query, .. }] if query.is_empty()
        ));
        assert!(app.searching);
    }

    #[test]
    fn test_search_failure_keeps_previous_results() {
        let mut app = app_with_results();
        app.search_input = "zzz".into();
        let fetch = app.search_now();

        let applied = app.apply_search(ticket(&fetch), Err(Error::NotFound("offline".into())));
        assert!(applied);
        assert_eq!(app.search_results.len(), 2);
        assert!(app.status.is_some());
        assert!(!app.searching);
    }

    #[test]
    fn test_stale_search_is_ignored() {
        let mut app = app_with_results();
        app.search_input = "a".into();
        let old = app.search_now();
        app.search_input = "ab".into();
        let new = app.search_now();

        assert!(!app.apply_search(ticket(&old), Ok(vec![manga("old")])));
        assert!(app.apply_search(ticket(&new), Ok(vec![manga("new")])));
        assert_eq!(app.search_results, [manga("new")]);
    }

    #[test]
    fn test_open_manga_issues_detail_and_feed() {
        let mut app = app_with_results();
        app.select_next_result();
        let fetches = app.open_selected_manga();

        assert_eq!(app.screen(), Screen::ChapterBrowsing);
        assert_eq!(app.session.current_manga_id(), Some("m2"));
        assert!(matches!(
            fetches.as_slice(),
            [Fetch::Detail { .. }, Fetch::Chapters { offset: 0, .. }]
        ));
    }

    #[test]
    fn test_detail_failure_does_not_block_chapters() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();

        app.apply_detail(ticket(&fetches[0]), Err(Error::NotFound("m1".into())));
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c1", "c2"])));

        assert!(app.detail.is_none());
        assert_eq!(app.chapter_page.as_ref().unwrap().items.len(), 2);
        assert_eq!(app.chapter_list_state.selected(), Some(0));
    }

    #[test]
    fn test_late_feed_for_previous_manga_is_dropped() {
        let mut app = app_with_results();
        let first = app.open_selected_manga();
        app.go_back();
        app.select_next_result();
        let second = app.open_selected_manga();

        assert!(!app.apply_chapters(ticket(&first[1]), 0, Ok(page(0, &["old"]))));
        assert!(app.chapter_page.is_none());
        assert!(app.apply_chapters(ticket(&second[1]), 0, Ok(page(0, &["new"]))));
        assert_eq!(app.chapter_page.as_ref().unwrap().items[0].id, "new");
    }

    #[test]
    fn test_chapter_failure_shows_empty_window() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Err(Error::NotFound("feed".into())));

        let page = app.chapter_page.as_ref().unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_next(25));
        assert!(app.status.is_some());
    }

    #[test]
    fn test_short_page_disables_next() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c1"])));

        assert!(app.next_chapter_page().is_none());
        assert!(app.previous_chapter_page().is_none());
    }

    #[test]
    fn test_next_disabled_while_previous_window_loads() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c"; 25])));

        let next = app.next_chapter_page().unwrap();
        app.apply_chapters(ticket(&next), 25, Ok(page(25, &["c"; 25])));
        assert!(app.previous_chapter_page().is_some());

        // The window at 25 is still displayed while 0 is in flight.
        assert!(!app.session.has_next_chapter_page(app.chapter_page.as_ref()));
        assert!(app.next_chapter_page().is_none());
        assert_eq!(app.session.chapter_offset(), 0);
    }

    #[test]
    fn test_reader_pages_and_stale_images() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c1", "c2"])));

        let fetches = app.open_selected_chapter();
        assert_eq!(app.screen(), Screen::Reading);
        assert_eq!(app.session.current_chapter_id(), Some("c1"));

        let urls = vec![
            "https://x/data-saver/h/1.png".to_string(),
            "https://x/data-saver/h/2.png".to_string(),
        ];
        let first = app.apply_pages(ticket(&fetches[0]), Ok(urls)).unwrap();
        assert!(matches!(&first, Fetch::PageImage { url, .. } if url.ends_with("1.png")));

        let second = app.next_page().unwrap();
        assert_eq!(app.current_page_url(), Some("https://x/data-saver/h/2.png"));
        assert!(app.next_page().is_none());

        let image = DynamicImage::new_rgb8(1, 1);
        assert!(!app.apply_page_image(ticket(&first), Some(image.clone())));
        assert!(app.apply_page_image(ticket(&second), Some(image)));
        assert!(app.reader.page_loaded);
    }

    #[test]
    fn test_unresolvable_chapter_has_no_pages() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c1"])));
        let fetches = app.open_selected_chapter();

        let next = app.apply_pages(ticket(&fetches[0]), Err(Error::NotFound("chapter c1".into())));
        assert!(next.is_none());
        assert!(app.reader.page_urls.is_empty());
        assert!(app.current_page_url().is_none());
    }

    #[test]
    fn test_back_navigation() {
        let mut app = app_with_results();
        let fetches = app.open_selected_manga();
        app.apply_chapters(ticket(&fetches[1]), 0, Ok(page(0, &["c1"])));
        app.open_selected_chapter();

        app.go_back();
        assert_eq!(app.screen(), Screen::ChapterBrowsing);
        // Same manga: the chapter list stays on screen while it refreshes.
        assert!(app.chapter_page.is_some());

        app.go_back();
        assert_eq!(app.screen(), Screen::Browsing);
        assert!(app.go_back().is_empty());
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("one two three four", 9, 5);
        assert_eq!(lines, ["one two", "three", "four"]);
        assert!(wrap_text("text", 0, 3).is_empty());
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a long title", 8), "a lon...");
    }
}
