use log::{debug, info, warn};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use scraper::{Html, Selector};
use url::Url;

use crate::models::NewsRecord;

/// Turns the listing page into news records.
///
/// The CMS behind the page does not render the list as HTML. It ships a
/// `<script type="text/xml">` block holding a `<datastore>` document whose
/// `<record>` elements each wrap one `<li>` of markup in CDATA:
///
/// ```text
/// <script type="text/xml"><datastore><recordset>
///   <record><![CDATA[<li><a href="/art/..." title="...">...</a><span class="font14">[2024-05-17]</span></li>]]></record>
/// </recordset></datastore></script>
/// ```
pub struct NewsExtractor {
    origin: Url,
    script: Selector,
    anchor: Selector,
    date: Selector,
}

impl NewsExtractor {
    pub fn new(origin: Url) -> Self {
        NewsExtractor {
            origin,
            script: Selector::parse(r#"script[type="text/xml"]"#).unwrap(),
            anchor: Selector::parse("a").unwrap(),
            date: Selector::parse(".font14").unwrap(),
        }
    }

    /// Records in page order, newest first. Malformed records are dropped, never fatal.
    pub fn parse(&self, raw: &str) -> Vec<NewsRecord> {
        let Some(payload) = self.listing_payload(raw) else {
            return Vec::new();
        };

        let bodies = record_bodies(&payload);
        let news: Vec<NewsRecord> = bodies
            .iter()
            .enumerate()
            .filter_map(|(index, body)| self.parse_record(index, body))
            .collect();

        info!("Listing holds {} news entries ({} records)", news.len(), bodies.len());
        news
    }

    fn listing_payload(&self, raw: &str) -> Option<String> {
        let document = Html::parse_document(raw);

        let Some(script) = document.select(&self.script).next() else {
            warn!("No embedded news listing found on the page");
            return None;
        };

        let payload: String = script.text().collect();
        if payload.trim().is_empty() {
            warn!("Embedded news listing is empty");
            return None;
        }

        Some(payload)
    }

    fn parse_record(&self, index: usize, body: &str) -> Option<NewsRecord> {
        let fragment = Html::parse_fragment(body);

        let (Some(anchor), Some(date)) = (
            fragment.select(&self.anchor).next(),
            fragment.select(&self.date).next(),
        ) else {
            debug!("Skipping record #{}: no link or no date", index);
            return None;
        };

        let title = anchor.value().attr("title").unwrap_or("").trim().to_string();
        let url = self.absolute_url(anchor.value().attr("href").unwrap_or(""));
        let date = clean_date(&date.text().collect::<String>());

        Some(NewsRecord { title, url, date })
    }

    /// Root-relative links are prefixed with the site origin as written; other
    /// relative forms are resolved against it. Absolute http(s) links pass through.
    pub fn absolute_url(&self, href: &str) -> String {
        let href = href.trim();
        if href.is_empty() || is_absolute(href) {
            return href.to_string();
        }

        let origin = self.origin.as_str().trim_end_matches('/');
        if href.starts_with('/') && !href.starts_with("//") {
            return format!("{}{}", origin, href);
        }

        match self.origin.join(href) {
            Ok(url) => url.to_string(),
            Err(_) => format!("{}/{}", origin, href),
        }
    }
}

fn is_absolute(href: &str) -> bool {
    Url::parse(href).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn clean_date(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| c == '[' || c == ']')
        .trim()
        .to_string()
}

/// Raw markup of every `<record>` in the payload, in document order.
///
/// Reading resumes after an ill-formed event as long as the reader moves
/// forward. A record still open at the end of the payload is dropped.
fn record_bodies(payload: &str) -> Vec<String> {
    let payload = escape_bare_ampersands(payload);
    let mut reader = Reader::from_str(&payload);
    reader.config_mut().check_end_names = false;

    let mut bodies = Vec::new();
    let mut current: Option<String> = None;
    let mut depth = 0usize;
    let mut last_error_at = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(tag)) => {
                if current.is_some() {
                    depth += 1;
                } else if is_record(tag.name().as_ref()) {
                    current = Some(String::new());
                    depth = 0;
                }
            }
            Ok(Event::Empty(tag)) => {
                if current.is_none() && is_record(tag.name().as_ref()) {
                    bodies.push(String::new());
                }
            }
            Ok(Event::End(_)) => match current.take() {
                Some(body) if depth == 0 => bodies.push(body),
                Some(body) => {
                    depth -= 1;
                    current = Some(body);
                }
                None => {}
            },
            Ok(Event::CData(data)) => {
                if let Some(body) = current.as_mut() {
                    body.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(body) = current.as_mut() {
                    let raw = String::from_utf8_lossy(&text);
                    match unescape(&raw) {
                        Ok(unescaped) => body.push_str(&unescaped),
                        Err(_) => body.push_str(&raw),
                    }
                }
            }
            Ok(Event::GeneralRef(entity)) => {
                if let Some(body) = current.as_mut() {
                    push_entity(body, &String::from_utf8_lossy(&entity));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                let position = reader.buffer_position();
                warn!("News listing payload is malformed near byte {}: {}", position, e);
                if last_error_at == Some(position) {
                    break;
                }
                last_error_at = Some(position);
            }
        }
    }

    bodies
}

/// Escapes `&` that does not start an entity reference. CDATA sections are copied untouched.
fn escape_bare_ampersands(payload: &str) -> String {
    const CDATA_OPEN: &str = "<![CDATA[";
    const CDATA_CLOSE: &str = "]]>";

    let mut out = String::with_capacity(payload.len());
    let mut rest = payload;

    while let Some(pos) = rest.find(|c: char| c == '&' || c == '<') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];

        if rest.starts_with(CDATA_OPEN) {
            let end = rest
                .find(CDATA_CLOSE)
                .map_or(rest.len(), |i| i + CDATA_CLOSE.len());
            out.push_str(&rest[..end]);
            rest = &rest[end..];
        } else if rest.starts_with('&') {
            out.push_str(if is_entity_reference(&rest[1..]) { "&" } else { "&amp;" });
            rest = &rest[1..];
        } else {
            out.push('<');
            rest = &rest[1..];
        }
    }

    out.push_str(rest);
    out
}

fn is_entity_reference(after_ampersand: &str) -> bool {
    let Some(end) = after_ampersand.find(';') else {
        return false;
    };
    let name = &after_ampersand[..end];

    if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(dec) = name.strip_prefix('#') {
        return !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit());
    }
    name.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && name.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_record(name: &[u8]) -> bool {
    name.eq_ignore_ascii_case(b"record")
}

fn push_entity(body: &mut String, name: &str) {
    if let Some(value) = resolve_predefined_entity(name) {
        body.push_str(value);
        return;
    }

    let code = if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = name.strip_prefix('#') {
        dec.parse().ok()
    } else {
        None
    };

    match code.and_then(char::from_u32) {
        Some(c) => body.push(c),
        None => {
            body.push('&');
            body.push_str(name);
            body.push(';');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><title>教育信息</title></head>
<body>
<div id="37116">
<script type="text/xml"><datastore>
<nextgroup><![CDATA[<a href="/module/web/jpage/dataproxy.jsp?page=1&webid=1&columnid=37116"></a>]]></nextgroup>
<recordset>
<record><![CDATA[<li><a href="/art/2024/5/17/art_37116_1.html" title=" 2024年春季学期开学通知 " target="_blank">2024年春季学期开学通知</a><span class="font14">[2024-05-17]</span></li>]]></record>
<record><![CDATA[<li><a href="https://other.example/notice.html" title="Outside notice">Outside notice</a><span class="font14">[2024-05-16]</span></li>]]></record>
<record><![CDATA[<li><a href="/art/2024/5/15/art_37116_3.html" title="No date here">No date here</a></li>]]></record>
<record><![CDATA[<li>No link <span class="font14">[2024-05-14]</span></li>]]></record>
<record><![CDATA[<li><a href="/art/2024/5/13/art_37116_5.html" title="Last one">Last one</a><span class="font14">[2024-05-13]</span></li>]]></record>
</recordset>
</datastore></script>
</div>
</body>
</html>"#;

    fn extractor() -> NewsExtractor {
        NewsExtractor::new(Url::parse("http://www.lixia.gov.cn").unwrap())
    }

    #[test]
    fn extracts_records_in_page_order() {
        let news = extractor().parse(PAGE);

        assert_eq!(news.len(), 3);
        assert_eq!(
            news[0],
            NewsRecord {
                title: "2024年春季学期开学通知".into(),
                url: "http://www.lixia.gov.cn/art/2024/5/17/art_37116_1.html".into(),
                date: "2024-05-17".into(),
            }
        );
        assert_eq!(news[1].url, "https://other.example/notice.html");
        assert_eq!(news[2].title, "Last one");
        assert_eq!(news[2].date, "2024-05-13");
    }

    #[test]
    fn parsing_is_idempotent() {
        let extractor = extractor();
        assert_eq!(extractor.parse(PAGE), extractor.parse(PAGE));
    }

    #[test]
    fn degenerate_pages_yield_nothing() {
        let extractor = extractor();
        assert!(extractor.parse("").is_empty());
        assert!(extractor.parse("<html><body><p>maintenance</p></body></html>").is_empty());
        assert!(extractor.parse(r#"<script type="text/xml"></script>"#).is_empty());
        assert!(extractor.parse(r#"<script type="text/xml">   </script>"#).is_empty());
        assert!(
            extractor
                .parse(r#"<script type="text/javascript"><record><![CDATA[<a href="/x" title="x"></a><span class="font14">[1]</span>]]></record></script>"#)
                .is_empty()
        );
    }

    #[test]
    fn broken_payload_keeps_earlier_records() {
        let page = r#"<script type="text/xml"><datastore><recordset>
<record><![CDATA[<li><a href="/a.html" title="Kept">Kept</a><span class="font14">[2024-01-02]</span></li>]]></record>
<record><![CDATA[<li><a href="/b.html" title="Lost">"#;
        let news = extractor().parse(page);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Kept");
    }

    #[test]
    fn escaped_record_markup_is_understood() {
        let page = r#"<script type="text/xml"><datastore><recordset><record>&lt;li&gt;&lt;a href="/art/9.html" title="Escaped &amp; fine"&gt;x&lt;/a&gt;&lt;span class="font14"&gt;[2024-02-03]&lt;/span&gt;&lt;/li&gt;</record></recordset></datastore></script>"#;
        let news = extractor().parse(page);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "Escaped & fine");
        assert_eq!(news[0].url, "http://www.lixia.gov.cn/art/9.html");
        assert_eq!(news[0].date, "2024-02-03");
    }

    #[test]
    fn relative_links_get_the_site_origin() {
        let extractor = extractor();
        assert_eq!(
            extractor.absolute_url("/col/37116/page.html"),
            "http://www.lixia.gov.cn/col/37116/page.html"
        );
        assert_eq!(extractor.absolute_url("http://other.site/x"), "http://other.site/x");
        assert_eq!(extractor.absolute_url(""), "");
    }

    #[test]
    fn root_relative_links_are_kept_verbatim() {
        let extractor = extractor();
        assert_eq!(
            extractor.absolute_url("/col/37116/通知 1.html"),
            "http://www.lixia.gov.cn/col/37116/通知 1.html"
        );
        assert_eq!(
            extractor.absolute_url("/a/../b.html"),
            "http://www.lixia.gov.cn/a/../b.html"
        );
        assert_eq!(extractor.absolute_url("page.html"), "http://www.lixia.gov.cn/page.html");
    }

    #[test]
    fn stray_ampersand_before_records_keeps_the_listing() {
        let page = r#"<script type="text/xml"><datastore>
<nextgroup><a href="/module/web/jpage/dataproxy.jsp?page=1&webid=1&columnid=37116"></a></nextgroup>
<recordset>
<record><![CDATA[<li><a href="/art/1.html?a=1&b=2" title="Kept">Kept</a><span class="font14">[2024-05-17]</span></li>]]></record>
<record><![CDATA[<li><a href="/art/2.html" title="Also kept">Also kept</a><span class="font14">[2024-05-16]</span></li>]]></record>
</recordset></datastore></script>"#;
        let news = extractor().parse(page);
        assert_eq!(news.len(), 2);
        assert_eq!(news[0].url, "http://www.lixia.gov.cn/art/1.html?a=1&b=2");
        assert_eq!(news[1].title, "Also kept");
    }

    #[test]
    fn bare_ampersands_are_escaped_outside_cdata() {
        assert_eq!(
            escape_bare_ampersands("a&b &amp; &#65; &#x41; <![CDATA[x&y]]> &"),
            "a&amp;b &amp; &#65; &#x41; <![CDATA[x&y]]> &amp;"
        );
    }

    #[test]
    fn missing_title_is_empty() {
        let page = r#"<script type="text/xml"><recordset><record><![CDATA[<a href="/n.html">untitled</a><span class="font14">2024-03-04]</span>]]></record></recordset></script>"#;
        let news = extractor().parse(page);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "");
        assert_eq!(news[0].date, "2024-03-04");
    }

    #[test]
    fn date_brackets_are_stripped() {
        assert_eq!(clean_date(" [2024-05-17] "), "2024-05-17");
        assert_eq!(clean_date("[[2024-05-17]]"), "2024-05-17");
        assert_eq!(clean_date("2024-05-17"), "2024-05-17");
    }

    #[test]
    fn numeric_entities_resolve() {
        let mut body = String::new();
        push_entity(&mut body, "lt");
        push_entity(&mut body, "#65");
        push_entity(&mut body, "#x42");
        push_entity(&mut body, "nbsp");
        assert_eq!(body, "<AB&nbsp;");
    }
}
