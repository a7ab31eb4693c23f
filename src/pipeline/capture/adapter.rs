//! Paged capture over the portal's results table.

use std::collections::VecDeque;

use chrono::NaiveDate;

use super::browser::{BrowserDriver, LoadState, Row, WaitTarget};
use super::parse::{parse_row, GuideRow};
use super::AcquisitionError;
use crate::config::PortalConfig;

/// Inclusive execution-date window for a capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Bounds are swapped if given in reverse.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self { start: day, end: day }
    }

    /// Portal input format.
    pub fn start_str(&self) -> String {
        self.start.format("%d/%m/%Y").to_string()
    }

    pub fn end_str(&self) -> String {
        self.end.format("%d/%m/%Y").to_string()
    }
}

/// Drives one browser session against the portal.
pub struct GuideCapture<B: BrowserDriver> {
    driver: B,
    portal: PortalConfig,
}

impl<B: BrowserDriver> GuideCapture<B> {
    pub fn new(driver: B, portal: PortalConfig) -> Self {
        Self { driver, portal }
    }

    pub fn driver_mut(&mut self) -> &mut B {
        &mut self.driver
    }

    pub fn into_driver(self) -> B {
        self.driver
    }

    /// Log into the portal. Any failure along the way is an authentication failure.
    pub fn login(&mut self) -> Result<(), AcquisitionError> {
        match self.submit_login() {
            Ok(()) => {
                tracing::info!(url = %self.portal.login_url(), "Portal login succeeded");
                Ok(())
            }
            Err(e) => Err(AcquisitionError::Authentication(e.to_string())),
        }
    }

    fn submit_login(&mut self) -> Result<(), AcquisitionError> {
        let sel = &self.portal.selectors;
        self.driver.goto(&self.portal.login_url())?;
        self.driver.fill(&sel.username_input, &self.portal.username)?;
        self.driver.fill(&sel.password_input, &self.portal.password)?;
        self.driver.click(&sel.login_button)?;
        self.driver.wait_for(&WaitTarget::selector(&sel.logged_in_marker))
    }

    /// Lazily yield guide rows page by page. The sequence is finite and cannot
    /// be resumed mid-way; a new call starts again from page 1.
    pub fn capture(&mut self, range: DateRange, max_results: Option<usize>) -> GuidePages<'_, B> {
        GuidePages {
            capture: self,
            range,
            max_results,
            buffer: VecDeque::new(),
            started: false,
            has_next: false,
            done: false,
            yielded: 0,
            pages: 0,
            skipped_rows: 0,
        }
    }

    fn open_search(&mut self, range: &DateRange) -> Result<(), AcquisitionError> {
        let url = self.portal.search_url();
        let sel = &self.portal.selectors;

        self.driver.goto(&url).map_err(|e| match e {
            AcquisitionError::Navigation { .. } => e,
            other => AcquisitionError::Navigation {
                url: url.clone(),
                reason: other.to_string(),
            },
        })?;
        self.driver.wait_for(&WaitTarget::State(LoadState::DomContentLoaded))?;
        self.driver.fill(&sel.date_start_input, &range.start_str())?;
        self.driver.fill(&sel.date_end_input, &range.end_str())?;
        self.driver.click(&sel.search_button)?;
        self.driver.wait_for(&WaitTarget::selector(&sel.result_rows))?;
        Ok(())
    }

    fn advance(&mut self) -> Result<(), AcquisitionError> {
        let sel = &self.portal.selectors;
        self.driver.click(&sel.next_page)?;
        self.driver.wait_for(&WaitTarget::selector(&sel.result_rows))
    }

    /// Parse the current page. Returns the guide rows, the number of rows
    /// skipped on extraction failure, and whether an enabled next control exists.
    fn read_page(&mut self) -> Result<(Vec<GuideRow>, usize, bool), AcquisitionError> {
        let rows_selector = self.portal.selectors.result_rows.clone();
        let next_selector = self.portal.selectors.next_page.clone();

        let rows = self.driver.query_rows(&rows_selector)?;
        let mut guides = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for (index, row) in rows.iter().enumerate() {
            match parse_row(row) {
                Ok(Some(guide)) => guides.push(guide),
                Ok(None) => {}
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(row = index, error = %e, "Skipping unreadable result row");
                }
            }
        }

        let next = self.driver.query_rows(&next_selector)?;
        let has_next = next.iter().any(next_control_enabled);
        Ok((guides, skipped, has_next))
    }
}

fn next_control_enabled(row: &Row) -> bool {
    let Some(cell) = row.cells.first() else {
        return false;
    };
    let class_disabled = cell
        .attr("class")
        .map(|c| c.split_whitespace().any(|c| c == "disabled"))
        .unwrap_or(false);
    cell.attr("disabled").is_none() && cell.attr("aria-disabled") != Some("true") && !class_disabled
}

/// Iterator over captured guide rows. Yields `Err` at most once, then ends.
pub struct GuidePages<'a, B: BrowserDriver> {
    capture: &'a mut GuideCapture<B>,
    range: DateRange,
    max_results: Option<usize>,
    buffer: VecDeque<GuideRow>,
    started: bool,
    has_next: bool,
    done: bool,
    yielded: usize,
    pages: usize,
    skipped_rows: usize,
}

impl<B: BrowserDriver> GuidePages<'_, B> {
    pub fn pages_loaded(&self) -> usize {
        self.pages
    }

    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }

    fn load_next_page(&mut self) -> Result<bool, AcquisitionError> {
        if !self.started {
            self.started = true;
            self.capture.open_search(&self.range)?;
        } else if self.has_next {
            self.capture.advance()?;
        } else {
            return Ok(false);
        }

        let (guides, skipped, has_next) = self.capture.read_page()?;
        self.pages += 1;
        self.skipped_rows += skipped;
        self.has_next = has_next;
        tracing::debug!(
            page = self.pages,
            guides = guides.len(),
            skipped,
            has_next,
            "Result page captured"
        );
        self.buffer.extend(guides);
        Ok(true)
    }
}

impl<B: BrowserDriver> Iterator for GuidePages<'_, B> {
    type Item = Result<GuideRow, AcquisitionError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if self.max_results.is_some_and(|max| self.yielded >= max) {
                self.done = true;
                return None;
            }
            if let Some(row) = self.buffer.pop_front() {
                self.yielded += 1;
                return Some(Ok(row));
            }
            match self.load_next_page() {
                Ok(true) => continue,
                Ok(false) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::PortalSelectors;
    use crate::pipeline::capture::browser::Cell;
    use std::collections::HashMap;

    pub(crate) fn portal() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".into(),
            login_path: "/login".into(),
            search_path: "/guias".into(),
            username: "clinica".into(),
            password: "segredo".into(),
            selectors: PortalSelectors::default(),
        }
    }

    /// Scripted portal: serves fixed pages and records every call.
    #[derive(Default)]
    pub(crate) struct FakePortal {
        pub pages: Vec<Vec<Row>>,
        pub current: usize,
        pub calls: Vec<String>,
        pub fail_goto: bool,
        pub fail_login_wait: bool,
        /// Render a disabled next control on the last page instead of none.
        pub disabled_next_on_last: bool,
    }

    impl FakePortal {
        pub fn with_pages(pages: Vec<Vec<Row>>) -> Self {
            Self {
                pages,
                ..Default::default()
            }
        }
    }

    impl BrowserDriver for FakePortal {
        fn goto(&mut self, url: &str) -> Result<(), AcquisitionError> {
            self.calls.push(format!("goto {url}"));
            if self.fail_goto {
                return Err(AcquisitionError::Navigation {
                    url: url.into(),
                    reason: "timeout".into(),
                });
            }
            self.current = 0;
            Ok(())
        }

        fn fill(&mut self, selector: &str, value: &str) -> Result<(), AcquisitionError> {
            self.calls.push(format!("fill {selector}={value}"));
            Ok(())
        }

        fn click(&mut self, selector: &str) -> Result<(), AcquisitionError> {
            self.calls.push(format!("click {selector}"));
            if selector == PortalSelectors::default().next_page {
                self.current += 1;
            }
            Ok(())
        }

        fn wait_for(&mut self, target: &WaitTarget) -> Result<(), AcquisitionError> {
            if let WaitTarget::Selector(s) = target {
                if self.fail_login_wait && *s == PortalSelectors::default().logged_in_marker {
                    return Err(AcquisitionError::SelectorNotFound(s.clone()));
                }
            }
            Ok(())
        }

        fn query_rows(&mut self, selector: &str) -> Result<Vec<Row>, AcquisitionError> {
            let selectors = PortalSelectors::default();
            if selector == selectors.result_rows {
                return Ok(self.pages.get(self.current).cloned().unwrap_or_default());
            }
            if selector == selectors.next_page {
                let is_last = self.current + 1 >= self.pages.len();
                if !is_last {
                    return Ok(vec![Row::new(vec![Cell::link("Próxima", "#")])]);
                }
                if self.disabled_next_on_last {
                    let mut attrs = HashMap::new();
                    attrs.insert("class".to_string(), "next disabled".to_string());
                    return Ok(vec![Row::new(vec![Cell {
                        text: "Próxima".into(),
                        link: None,
                        attributes: attrs,
                    }])]);
                }
                return Ok(vec![]);
            }
            Err(AcquisitionError::SelectorNotFound(selector.into()))
        }
    }

    pub(crate) fn guide_row(numero: &str, data: &str) -> Row {
        Row::new(vec![
            Cell::link(numero, &format!("/guia/{numero}")),
            Cell::text(data),
            Cell::text("Fisioterapia motora"),
        ])
    }

    fn page(numeros: &[&str]) -> Vec<Row> {
        let mut rows = vec![Row::header(vec![Cell::text("Nº Guia"), Cell::text("Data")])];
        rows.extend(numeros.iter().map(|n| guide_row(n, "15/01/2024 10:00")));
        rows
    }

    fn range() -> DateRange {
        DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[test]
    fn yields_rows_from_every_page_then_stops() {
        let driver = FakePortal::with_pages(vec![
            page(&["100001", "100002"]),
            page(&["100003"]),
            page(&["100004", "100005"]),
        ]);
        let mut capture = GuideCapture::new(driver, portal());
        let mut pages = capture.capture(range(), None);
        let numeros: Vec<String> = pages
            .by_ref()
            .map(|r| r.unwrap().numero_guia)
            .collect();
        assert_eq!(numeros, vec!["100001", "100002", "100003", "100004", "100005"]);
        assert_eq!(pages.pages_loaded(), 3);
        assert!(pages.next().is_none());
    }

    #[test]
    fn disabled_next_control_ends_capture() {
        let mut driver = FakePortal::with_pages(vec![page(&["100001"]), page(&["100002"])]);
        driver.disabled_next_on_last = true;
        let mut capture = GuideCapture::new(driver, portal());
        let mut pages = capture.capture(range(), None);
        assert_eq!(pages.by_ref().count(), 2);
        assert_eq!(pages.pages_loaded(), 2);
    }

    #[test]
    fn max_results_stops_early_without_loading_more_pages() {
        let driver = FakePortal::with_pages(vec![
            page(&["100001", "100002"]),
            page(&["100003"]),
        ]);
        let mut capture = GuideCapture::new(driver, portal());
        let mut pages = capture.capture(range(), Some(2));
        assert_eq!(pages.by_ref().count(), 2);
        assert_eq!(pages.pages_loaded(), 1);
    }

    #[test]
    fn search_form_uses_portal_date_format() {
        let driver = FakePortal::with_pages(vec![page(&["100001"])]);
        let mut capture = GuideCapture::new(driver, portal());
        let _ = capture.capture(range(), None).count();
        let calls = &capture.driver_mut().calls;
        assert!(calls.contains(&"goto https://portal.test/guias".to_string()));
        assert!(calls.contains(&"fill #dataInicial=01/01/2024".to_string()));
        assert!(calls.contains(&"fill #dataFinal=31/01/2024".to_string()));
    }

    #[test]
    fn unreadable_row_is_skipped_not_fatal() {
        let rows = vec![
            guide_row("100001", "15/01/2024"),
            Row::new(vec![Cell::link("100002", "#"), Cell::text("sem data")]),
            guide_row("100003", "16/01/2024"),
        ];
        let driver = FakePortal::with_pages(vec![rows]);
        let mut capture = GuideCapture::new(driver, portal());
        let mut pages = capture.capture(range(), None);
        let numeros: Vec<String> = pages.by_ref().map(|r| r.unwrap().numero_guia).collect();
        assert_eq!(numeros, vec!["100001", "100003"]);
        assert_eq!(pages.skipped_rows(), 1);
    }

    #[test]
    fn navigation_failure_is_fatal_and_yielded_once() {
        let mut driver = FakePortal::with_pages(vec![page(&["100001"])]);
        driver.fail_goto = true;
        let mut capture = GuideCapture::new(driver, portal());
        let mut pages = capture.capture(range(), None);
        assert!(matches!(pages.next(), Some(Err(AcquisitionError::Navigation { .. }))));
        assert!(pages.next().is_none());
    }

    #[test]
    fn fresh_capture_restarts_from_first_page() {
        let driver = FakePortal::with_pages(vec![page(&["100001"]), page(&["100002"])]);
        let mut capture = GuideCapture::new(driver, portal());
        let first: Vec<_> = capture.capture(range(), Some(1)).collect();
        let second: Vec<_> = capture.capture(range(), Some(1)).collect();
        assert_eq!(first[0].as_ref().unwrap().numero_guia, "100001");
        assert_eq!(second[0].as_ref().unwrap().numero_guia, "100001");
    }

    #[test]
    fn login_failure_is_authentication_error() {
        let mut driver = FakePortal::default();
        driver.fail_login_wait = true;
        let mut capture = GuideCapture::new(driver, portal());
        assert!(matches!(capture.login(), Err(AcquisitionError::Authentication(_))));
    }

    #[test]
    fn login_fills_credentials() {
        let mut capture = GuideCapture::new(FakePortal::default(), portal());
        capture.login().unwrap();
        let calls = &capture.driver_mut().calls;
        assert!(calls.contains(&"fill #username=clinica".to_string()));
        assert!(calls.contains(&"click button[type=submit]".to_string()));
    }

    #[test]
    fn reversed_range_is_normalised() {
        let a = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let r = DateRange::new(a, b);
        assert_eq!(r.start, b);
        assert_eq!(r.end, a);
    }
}
