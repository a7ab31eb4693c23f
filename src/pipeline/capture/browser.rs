//! The capability set the capture adapter needs from a browser driver.

use std::collections::HashMap;

use super::AcquisitionError;

/// Page load milestones a driver can wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitTarget {
    Selector(String),
    State(LoadState),
}

impl WaitTarget {
    pub fn selector(selector: &str) -> Self {
        Self::Selector(selector.to_string())
    }
}

/// One table cell as seen by the driver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    pub text: String,
    /// `href` of the first anchor inside the cell, if any.
    pub link: Option<String>,
    pub attributes: HashMap<String, String>,
}

impl Cell {
    pub fn text(text: &str) -> Self {
        Self {
            text: text.to_string(),
            ..Default::default()
        }
    }

    pub fn link(text: &str, href: &str) -> Self {
        Self {
            text: text.to_string(),
            link: Some(href.to_string()),
            ..Default::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// One matched element (usually a `<tr>`) with its cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// True for `<th>` rows.
    pub is_header: bool,
}

impl Row {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            is_header: false,
        }
    }

    pub fn header(cells: Vec<Cell>) -> Self {
        Self {
            cells,
            is_header: true,
        }
    }
}

/// Browser automation collaborator. Implementations wrap a real driver
/// (WebDriver, CDP, ...); tests use a scripted fake.
pub trait BrowserDriver {
    fn goto(&mut self, url: &str) -> Result<(), AcquisitionError>;
    fn fill(&mut self, selector: &str, value: &str) -> Result<(), AcquisitionError>;
    fn click(&mut self, selector: &str) -> Result<(), AcquisitionError>;
    fn wait_for(&mut self, target: &WaitTarget) -> Result<(), AcquisitionError>;
    /// Every element matching `selector`, each flattened to its cells.
    /// Elements without cells come back as a single cell describing the element itself.
    fn query_rows(&mut self, selector: &str) -> Result<Vec<Row>, AcquisitionError>;
}

impl<B: BrowserDriver + ?Sized> BrowserDriver for Box<B> {
    fn goto(&mut self, url: &str) -> Result<(), AcquisitionError> {
        (**self).goto(url)
    }

    fn fill(&mut self, selector: &str, value: &str) -> Result<(), AcquisitionError> {
        (**self).fill(selector, value)
    }

    fn click(&mut self, selector: &str) -> Result<(), AcquisitionError> {
        (**self).click(selector)
    }

    fn wait_for(&mut self, target: &WaitTarget) -> Result<(), AcquisitionError> {
        (**self).wait_for(target)
    }

    fn query_rows(&mut self, selector: &str) -> Result<Vec<Row>, AcquisitionError> {
        (**self).query_rows(selector)
    }
}
