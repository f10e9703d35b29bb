//! Lenient page-number pagination for the post list.
//!
//! A missing or malformed page number resolves to the first page. A number
//! outside `1..=num_pages`, zero and negatives included, resolves to the last
//! page, so every request lands on a real page.

use url::form_urlencoded;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u64,
    pub num_pages: u64,
    pub per_page: u64,
    pub total: u64,
}

impl Page {
    pub fn resolve(requested: Option<&str>, total: u64, per_page: u64) -> Self {
        let per_page = per_page.max(1);
        let num_pages = total.div_ceil(per_page).max(1);

        let number = match requested.map(str::trim).map(str::parse::<i64>) {
            Some(Ok(n)) if n < 1 => num_pages,
            Some(Ok(n)) => (n as u64).min(num_pages),
            _ => 1,
        };

        Self {
            number,
            num_pages,
            per_page,
            total,
        }
    }

    pub fn offset(&self) -> u64 {
        (self.number - 1) * self.per_page
    }

    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }
}

/// Rebuild `path?query` with `page` set to `page`, keeping every other
/// parameter in its original order. An absent `page` is appended.
pub fn page_url(path: &str, query: &[(String, String)], page: u64) -> String {
    let page = page.to_string();
    let mut replaced = false;
    let mut serializer = form_urlencoded::Serializer::new(String::new());

    for (key, value) in query {
        if key == "page" {
            if !replaced {
                serializer.append_pair("page", &page);
                replaced = true;
            }
        } else {
            serializer.append_pair(key, value);
        }
    }
    if !replaced {
        serializer.append_pair("page", &page);
    }

    format!("{}?{}", path, serializer.finish())
}

/// Parse a raw query string into ordered pairs.
pub fn parse_query(raw: Option<&str>) -> Vec<(String, String)> {
    raw.map(|q| {
        form_urlencoded::parse(q.as_bytes())
            .into_owned()
            .collect::<Vec<_>>()
    })
    .unwrap_or_default()
}
