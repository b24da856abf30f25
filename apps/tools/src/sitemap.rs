use chrono::NaiveDate;

pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// Public pages of the journal site, in the order they appear in the sitemap.
pub const DEFAULT_ROUTES: [&str; 9] = [
    "/",
    "/about",
    "/journal",
    "/editorial-board",
    "/author-page",
    "/archive",
    "/submission",
    "/contact",
    "/login",
];

const CHANGE_FREQUENCY: &str = "weekly";

fn priority(route: &str) -> &'static str {
    if route == "/" {
        "1.0"
    } else {
        "0.8"
    }
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders `sitemap.xml` for `routes` under `domain` (scheme included, e.g.
/// `https://journal.example`).
pub fn build_sitemap<S: AsRef<str>>(domain: &str, routes: &[S], lastmod: NaiveDate) -> String {
    let domain = domain.trim_end_matches('/');
    let lastmod = lastmod.format("%Y-%m-%d");

    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    xml.push_str(&format!("<urlset xmlns=\"{SITEMAP_NAMESPACE}\">\n"));
    for route in routes {
        let route = route.as_ref();
        let path = if route.starts_with('/') {
            route.to_string()
        } else {
            format!("/{route}")
        };
        xml.push_str("  <url>\n");
        xml.push_str(&format!(
            "    <loc>{}</loc>\n",
            escape_xml(&format!("{domain}{path}"))
        ));
        xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
        xml.push_str(&format!("    <changefreq>{CHANGE_FREQUENCY}</changefreq>\n"));
        xml.push_str(&format!("    <priority>{}</priority>\n", priority(&path)));
        xml.push_str("  </url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

#[cfg(test)]
#[path = "tests/sitemap_tests.rs"]
mod tests;
