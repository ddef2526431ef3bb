//! Selector-driven adapter for server-rendered career pages.

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::{ConfigurationError, ExtractResult, ExtractionError};
use crate::traits::adapter::{Extraction, SourceAdapter};
use crate::traits::transport::{FetchRequest, RawContent};
use crate::types::posting::JobPostingCandidate;

/// CSS selectors describing one listing page layout.
///
/// `title`, `link`, `location` and `department` are evaluated relative to
/// each `item` element.
#[derive(Debug, Clone, PartialEq)]
pub struct HtmlSelectors {
    /// Element that must be present for the page to be recognized
    pub container: String,
    pub item: String,
    pub title: String,
    /// Anchor whose `href` is the posting URL
    pub link: String,
    pub location: Option<String>,
    pub department: Option<String>,
    /// Attribute on the item element holding the source's job id
    pub id_attribute: Option<String>,
    /// Anchor pointing at the next page of results
    pub next_page: Option<String>,
}

impl HtmlSelectors {
    pub fn new(
        container: impl Into<String>,
        item: impl Into<String>,
        title: impl Into<String>,
        link: impl Into<String>,
    ) -> Self {
        Self {
            container: container.into(),
            item: item.into(),
            title: title.into(),
            link: link.into(),
            location: None,
            department: None,
            id_attribute: None,
            next_page: None,
        }
    }

    pub fn with_location(mut self, selector: impl Into<String>) -> Self {
        self.location = Some(selector.into());
        self
    }

    pub fn with_department(mut self, selector: impl Into<String>) -> Self {
        self.department = Some(selector.into());
        self
    }

    pub fn with_id_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.id_attribute = Some(attribute.into());
        self
    }

    pub fn with_next_page(mut self, selector: impl Into<String>) -> Self {
        self.next_page = Some(selector.into());
        self
    }

    fn all(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("container", Some(self.container.as_str())),
            ("item", Some(self.item.as_str())),
            ("title", Some(self.title.as_str())),
            ("link", Some(self.link.as_str())),
            ("location", self.location.as_deref()),
            ("department", self.department.as_deref()),
            ("next_page", self.next_page.as_deref()),
        ]
        .into_iter()
        .filter_map(|(name, selector)| selector.map(|s| (name, s)))
    }
}

/// Adapter for a static HTML listing page.
pub struct HtmlListingAdapter {
    name: String,
    start_url: String,
    selectors: HtmlSelectors,
}

impl HtmlListingAdapter {
    /// Fails if `start_url` is not absolute or any selector does not parse.
    pub fn new(
        name: impl Into<String>,
        start_url: impl Into<String>,
        selectors: HtmlSelectors,
    ) -> Result<Self, ConfigurationError> {
        let start_url = start_url.into();
        if Url::parse(&start_url).is_err() {
            return Err(ConfigurationError::InvalidOption {
                name: "start_url".to_string(),
                reason: format!("not an absolute URL: {}", start_url),
            });
        }
        for (name, selector) in selectors.all() {
            Selector::parse(selector).map_err(|e| ConfigurationError::InvalidOption {
                name: format!("selectors.{}", name),
                reason: e.to_string(),
            })?;
        }

        Ok(Self {
            name: name.into(),
            start_url,
            selectors,
        })
    }

    fn parse_item(&self, item: ElementRef<'_>, base: &Url, sel: &Compiled) -> Result<JobPostingCandidate, String> {
        let title = item
            .select(&sel.title)
            .next()
            .map(element_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or("missing title")?;
        let href = item
            .select(&sel.link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .ok_or("missing link")?;
        let url = base
            .join(href.trim())
            .map_err(|e| format!("bad link {}: {}", href, e))?;

        let mut candidate = JobPostingCandidate::new(title, url.to_string());
        candidate.location = sel
            .location
            .as_ref()
            .and_then(|s| item.select(s).next())
            .map(element_text);
        candidate.department = sel
            .department
            .as_ref()
            .and_then(|s| item.select(s).next())
            .map(element_text);
        candidate.external_id = self
            .selectors
            .id_attribute
            .as_deref()
            .and_then(|attr| item.value().attr(attr))
            .map(str::to_string);
        Ok(candidate)
    }
}

struct Compiled {
    container: Selector,
    item: Selector,
    title: Selector,
    link: Selector,
    location: Option<Selector>,
    department: Option<Selector>,
}

impl Compiled {
    fn new(selectors: &HtmlSelectors) -> ExtractResult<Self> {
        let parse = |s: &str| {
            Selector::parse(s).map_err(|e| ExtractionError::fatal(format!("selector {}: {}", s, e)))
        };
        let parse_opt = |s: Option<&str>| s.map(parse).transpose();

        Ok(Self {
            container: parse(&selectors.container)?,
            item: parse(&selectors.item)?,
            title: parse(&selectors.title)?,
            link: parse(&selectors.link)?,
            location: parse_opt(selectors.location.as_deref())?,
            department: parse_opt(selectors.department.as_deref())?,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>()
}

impl SourceAdapter for HtmlListingAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn first_request(&self) -> FetchRequest {
        FetchRequest::get(&self.start_url)
    }

    fn next_request(&self, _previous: &FetchRequest, raw: &RawContent) -> Option<FetchRequest> {
        let next_selector = Selector::parse(self.selectors.next_page.as_deref()?).ok()?;
        let base = Url::parse(&raw.url).ok()?;
        let document = Html::parse_document(&raw.body);
        let href = document
            .select(&next_selector)
            .next()
            .and_then(|a| a.value().attr("href"))?;
        let next = base.join(href.trim()).ok()?;
        Some(FetchRequest::get(next.to_string()))
    }

    fn extract(&self, raw: &RawContent) -> ExtractResult<Extraction> {
        let sel = Compiled::new(&self.selectors)?;
        let base = Url::parse(&raw.url)
            .map_err(|e| ExtractionError::fatal(format!("page url {}: {}", raw.url, e)))?;
        let document = Html::parse_document(&raw.body);

        let container = document
            .select(&sel.container)
            .next()
            .ok_or_else(|| ExtractionError::fatal(format!("no element matches {}", self.selectors.container)))?;

        let mut extraction = Extraction::new();
        for (index, item) in container.select(&sel.item).enumerate() {
            match self.parse_item(item, &base, &sel) {
                Ok(candidate) => extraction.push(candidate),
                Err(reason) => extraction.skip(index, reason),
            }
        }
        Ok(extraction)
    }
}
