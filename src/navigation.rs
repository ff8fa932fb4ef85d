//! Navigation session: current selections, screen transitions with
//! prerequisite redirects, and request tickets for superseding stale fetches.

use std::collections::HashMap;

use crate::backend::mangadex::ChapterPage;
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Screen {
    #[default]
    Browsing,
    ChapterBrowsing,
    Reading,
}

impl Screen {
    pub fn path(self) -> &'static str {
        match self {
            Screen::Browsing => "/",
            Screen::ChapterBrowsing => "/manga",
            Screen::Reading => "/reader",
        }
    }
}

/// A navigation target. Paths are `/`, `/manga[/{id}]` and `/reader[/{id}]`;
/// anything else is the root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    Root,
    Manga(Option<String>),
    Reader(Option<String>),
}

impl Route {
    pub fn parse(path: &str) -> Route {
        let path = path.trim().trim_start_matches('#');
        let mut segments = path.split('/').filter(|s| !s.is_empty());

        match (segments.next(), segments.next(), segments.next()) {
            (Some("manga"), id, None) => Route::Manga(id.map(str::to_string)),
            (Some("reader"), id, None) => Route::Reader(id.map(str::to_string)),
            _ => Route::Root,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Search,
    Detail,
    Chapters,
    Pages,
    PageImage,
}

/// Identifies one issued request. Only the most recently issued ticket of
/// each kind is current.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ticket {
    pub kind: FetchKind,
    generation: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Fetch {
    Search { query: String, ticket: Ticket },
    Detail { manga_id: String, ticket: Ticket },
    Chapters { manga_id: String, offset: usize, ticket: Ticket },
    Pages { chapter_id: String, ticket: Ticket },
    PageImage { url: String, ticket: Ticket },
}

#[derive(Debug)]
pub struct Transition {
    pub screen: Screen,
    pub redirected: bool,
    pub fetches: Vec<Fetch>,
}

#[derive(Debug)]
pub struct Session {
    current_manga_id: Option<String>,
    current_chapter_id: Option<String>,
    screen: Screen,
    search_query: String,
    chapter_offset: usize,
    page_size: usize,
    generations: HashMap<FetchKind, u64>,
}

impl Session {
    pub fn new(page_size: usize) -> Self {
        Self {
            current_manga_id: None,
            current_chapter_id: None,
            screen: Screen::Browsing,
            search_query: String::new(),
            chapter_offset: 0,
            page_size: page_size.max(1),
            generations: HashMap::new(),
        }
    }

    pub fn screen(&self) -> Screen {
        self.screen
    }

    pub fn current_manga_id(&self) -> Option<&str> {
        self.current_manga_id.as_deref()
    }

    pub fn current_chapter_id(&self) -> Option<&str> {
        self.current_chapter_id.as_deref()
    }

    pub fn search_query(&self) -> &str {
        &self.search_query
    }

    pub fn chapter_offset(&self) -> usize {
        self.chapter_offset
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn require_manga_id(&self) -> Result<&str> {
        self.current_manga_id().ok_or(Error::PrerequisiteMissing("manga"))
    }

    pub fn require_chapter_id(&self) -> Result<&str> {
        self.current_chapter_id().ok_or(Error::PrerequisiteMissing("chapter"))
    }

    fn issue(&mut self, kind: FetchKind) -> Ticket {
        let generation = self.generations.entry(kind).or_insert(0);
        *generation += 1;
        Ticket {
            kind,
            generation: *generation,
        }
    }

    fn supersede(&mut self, kinds: &[FetchKind]) {
        for kind in kinds {
            self.issue(*kind);
        }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.generations.get(&ticket.kind).copied() == Some(ticket.generation)
    }

    /// Walks up from `requested` until every prerequisite is met.
    fn resolve(&self, requested: Screen) -> Screen {
        match requested {
            Screen::Reading if self.require_chapter_id().is_err() => {
                self.resolve(Screen::ChapterBrowsing)
            }
            Screen::ChapterBrowsing if self.require_manga_id().is_err() => Screen::Browsing,
            screen => screen,
        }
    }

    pub fn enter(&mut self, route: Route) -> Transition {
        let requested = match route {
            Route::Root => Screen::Browsing,
            Route::Manga(id) => {
                if let Some(id) = id {
                    self.current_manga_id = Some(id);
                    self.chapter_offset = 0;
                }
                Screen::ChapterBrowsing
            }
            Route::Reader(id) => {
                if let Some(id) = id {
                    self.current_chapter_id = Some(id);
                }
                Screen::Reading
            }
        };

        let screen = self.resolve(requested);
        let redirected = screen != requested;
        if redirected {
            log::debug!("redirect {} -> {}", requested.path(), screen.path());
        }

        self.screen = screen;
        Transition {
            screen,
            redirected,
            fetches: self.screen_fetches(),
        }
    }

    /// Re-issues the fetches of the current screen.
    pub fn reload(&mut self) -> Vec<Fetch> {
        self.screen_fetches()
    }

    fn screen_fetches(&mut self) -> Vec<Fetch> {
        match self.screen {
            Screen::Browsing => {
                self.supersede(&[
                    FetchKind::Detail,
                    FetchKind::Chapters,
                    FetchKind::Pages,
                    FetchKind::PageImage,
                ]);
                let query = self.search_query.clone();
                vec![self.search(&query)]
            }
            Screen::ChapterBrowsing => {
                self.supersede(&[FetchKind::Pages, FetchKind::PageImage]);
                match self.current_manga_id.clone() {
                    Some(manga_id) => vec![
                        Fetch::Detail {
                            manga_id: manga_id.clone(),
                            ticket: self.issue(FetchKind::Detail),
                        },
                        self.chapters_fetch(manga_id),
                    ],
                    None => Vec::new(),
                }
            }
            Screen::Reading => {
                self.supersede(&[FetchKind::PageImage]);
                match self.current_chapter_id.clone() {
                    Some(chapter_id) => vec![Fetch::Pages {
                        chapter_id,
                        ticket: self.issue(FetchKind::Pages),
                    }],
                    None => Vec::new(),
                }
            }
        }
    }

    fn chapters_fetch(&mut self, manga_id: String) -> Fetch {
        Fetch::Chapters {
            manga_id,
            offset: self.chapter_offset,
            ticket: self.issue(FetchKind::Chapters),
        }
    }

    pub fn search(&mut self, query: &str) -> Fetch {
        self.search_query = query.to_string();
        Fetch::Search {
            query: query.to_string(),
            ticket: self.issue(FetchKind::Search),
        }
    }

    pub fn select_manga(&mut self, manga_id: &str) -> Transition {
        self.enter(Route::Manga(Some(manga_id.to_string())))
    }

    pub fn select_chapter(&mut self, chapter_id: &str) -> Transition {
        self.enter(Route::Reader(Some(chapter_id.to_string())))
    }

    /// True when `page` is the window currently requested and it came back
    /// full. Stays false while a different window is loading.
    pub fn has_next_chapter_page(&self, page: Option<&ChapterPage>) -> bool {
        page.is_some_and(|p| p.offset == self.chapter_offset && p.has_next(self.page_size))
    }

    pub fn has_previous_chapter_page(&self) -> bool {
        self.chapter_offset > 0
    }

    pub fn next_chapter_page(&mut self, page: &ChapterPage) -> Option<Fetch> {
        if self.screen != Screen::ChapterBrowsing || !self.has_next_chapter_page(Some(page)) {
            return None;
        }
        let manga_id = self.current_manga_id.clone()?;
        self.chapter_offset += self.page_size;
        Some(self.chapters_fetch(manga_id))
    }

    pub fn previous_chapter_page(&mut self) -> Option<Fetch> {
        if self.screen != Screen::ChapterBrowsing || !self.has_previous_chapter_page() {
            return None;
        }
        let manga_id = self.current_manga_id.clone()?;
        self.chapter_offset = self.chapter_offset.saturating_sub(self.page_size);
        Some(self.chapters_fetch(manga_id))
    }

    pub fn page_image(&mut self, url: &str) -> Fetch {
        Fetch::PageImage {
            url: url.to_string(),
            ticket: self.issue(FetchKind::PageImage),
        }
    }
}
