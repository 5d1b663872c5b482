//! Parsed HTML page with selector helpers.

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

/// An HTML page together with the URL it was served from.
pub struct Page {
    url: Url,
    html: Html,
}

impl Page {
    pub fn parse(url: Url, body: &str) -> Self {
        Self {
            url,
            html: Html::parse_document(body),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Elements matching `selector`, in document order.
    pub fn select<'a>(&'a self, selector: &'a Selector) -> impl Iterator<Item = ElementRef<'a>> + 'a {
        self.html.select(selector)
    }

    /// Text of the first match, or `None` when nothing matches or it is blank.
    pub fn first_text(&self, selector: &Selector) -> Option<String> {
        self.html
            .select(selector)
            .next()
            .map(|el| direct_texts(el).join("\n"))
            .filter(|s| !s.is_empty())
    }

    /// Trimmed direct text nodes of every match.
    pub fn all_texts(&self, selector: &Selector) -> Vec<String> {
        self.html.select(selector).flat_map(direct_texts).collect()
    }

    /// Attribute values of every match that carries `attr`.
    pub fn attrs(&self, selector: &Selector, attr: &str) -> Vec<String> {
        self.html
            .select(selector)
            .filter_map(|el| el.value().attr(attr).map(str::to_string))
            .collect()
    }

    /// Resolve a possibly relative link against the page URL.
    pub fn resolve(&self, href: &str) -> Option<Url> {
        self.url.join(href).ok()
    }
}

/// Trimmed, non-empty text nodes that are direct children of `el`.
pub fn direct_texts(el: ElementRef<'_>) -> Vec<String> {
    el.children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(text.trim().to_string()),
            _ => None,
        })
        .filter(|s| !s.is_empty())
        .collect()
}

/// All descendant text of `el`, whitespace-trimmed.
pub fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> Page {
        Page::parse(Url::parse("https://portal.test/dir/page.aspx").unwrap(), body)
    }

    #[test]
    fn test_first_text_and_blank() {
        let p = page(r#"<span id="a"> hello </span><span id="b">  </span>"#);
        assert_eq!(p.first_text(&Selector::parse("span#a").unwrap()), Some("hello".into()));
        assert_eq!(p.first_text(&Selector::parse("span#b").unwrap()), None);
        assert_eq!(p.first_text(&Selector::parse("span#c").unwrap()), None);
    }

    #[test]
    fn test_all_texts_splits_on_breaks() {
        let p = page(r#"<span id="codes">100-01<br>200-02<br> 300-03 </span>"#);
        assert_eq!(
            p.all_texts(&Selector::parse("span#codes").unwrap()),
            vec!["100-01", "200-02", "300-03"]
        );
    }

    #[test]
    fn test_attrs_and_resolve() {
        let p = page(r#"<a href="Detail.aspx?id=1">x</a><a>no href</a>"#);
        let hrefs = p.attrs(&Selector::parse("a").unwrap(), "href");
        assert_eq!(hrefs, vec!["Detail.aspx?id=1"]);
        assert_eq!(
            p.resolve(&hrefs[0]).unwrap().as_str(),
            "https://portal.test/dir/Detail.aspx?id=1"
        );
    }
}
