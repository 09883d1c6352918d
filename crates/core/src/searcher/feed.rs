//! Torznab RSS feed parsing.
//!
//! Items are read with a streaming XML reader that keeps going past the usual
//! indexer sloppiness: mismatched end tags, raw ampersands, truncated bodies.
//! Whatever items were opened before the feed breaks off are still returned.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex_lite::Regex;
use tracing::debug;

use super::FeedItem;

static MAGNET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)magnet:\?[^\s"'<>]+"#).unwrap());

/// Parse every `<item>` in a feed. Items are never dropped; a missing title
/// becomes `(no title)`.
pub fn parse_feed(xml: &str) -> Vec<FeedItem> {
    let mut reader = Reader::from_str(xml);
    let config = reader.config_mut();
    config.trim_text(true);
    config.check_end_names = false;

    let mut items = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut field = Field::Other;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if e.name().as_ref() == b"item" {
                    current = Some(RawItem::default());
                    field = Field::Other;
                } else if let Some(item) = current.as_mut() {
                    item.element(&e);
                    field = Field::from_name(e.name().as_ref());
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(item) = current.as_mut() {
                    item.element(&e);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(item) = current.as_mut() {
                    let value = text
                        .unescape()
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                    item.text(field, &value);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(item) = current.as_mut() {
                    item.text(field, &String::from_utf8_lossy(&data));
                }
            }
            Ok(Event::End(e)) => {
                if e.name().as_ref() == b"item" {
                    if let Some(item) = current.take() {
                        items.push(item.finish());
                    }
                }
                field = Field::Other;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(
                    error = %e,
                    position = reader.buffer_position(),
                    "Feed ended with malformed XML"
                );
                break;
            }
            _ => {}
        }
    }

    if let Some(item) = current.take() {
        items.push(item.finish());
    }

    items
}

/// Item child whose text is collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Guid,
    Link,
    PubDate,
    Size,
    Other,
}

impl Field {
    fn from_name(name: &[u8]) -> Self {
        match name {
            b"title" => Field::Title,
            b"guid" => Field::Guid,
            b"link" => Field::Link,
            b"pubDate" => Field::PubDate,
            b"size" => Field::Size,
            _ => Field::Other,
        }
    }
}

#[derive(Debug, Default)]
struct RawItem {
    title: String,
    guid: String,
    link: String,
    enclosure: Option<String>,
    pub_date: String,
    size: String,
    magnet: Option<String>,
    attrs: HashMap<String, String>,
}

impl RawItem {
    /// Attribute-carrying children: `<enclosure url>` and `<torznab:attr name value>`.
    fn element(&mut self, e: &BytesStart<'_>) {
        let values: Vec<(Vec<u8>, String)> = e
            .attributes()
            .flatten()
            .map(|attr| {
                let value = attr
                    .unescape_value()
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                (attr.key.as_ref().to_vec(), value)
            })
            .collect();

        for (_, value) in &values {
            self.scan_magnet(value);
        }

        let get = |key: &[u8]| {
            values
                .iter()
                .find(|(k, _)| k.as_slice() == key)
                .map(|(_, v)| v.clone())
        };

        match e.name().as_ref() {
            b"enclosure" => {
                if self.enclosure.is_none() {
                    self.enclosure = get(b"url").filter(|u| !u.trim().is_empty());
                }
            }
            _ if e.local_name().as_ref() == b"attr" => {
                if let (Some(name), Some(value)) = (get(b"name"), get(b"value")) {
                    self.attrs
                        .entry(name.to_lowercase())
                        .or_insert_with(|| value.trim().to_string());
                }
            }
            _ => {}
        }
    }

    fn text(&mut self, field: Field, value: &str) {
        self.scan_magnet(value);
        let target = match field {
            Field::Title => &mut self.title,
            Field::Guid => &mut self.guid,
            Field::Link => &mut self.link,
            Field::PubDate => &mut self.pub_date,
            Field::Size => &mut self.size,
            Field::Other => return,
        };
        target.push_str(value);
    }

    fn scan_magnet(&mut self, value: &str) {
        if self.magnet.is_none() {
            self.magnet = MAGNET_RE.find(value).map(|m| m.as_str().to_string());
        }
    }

    fn finish(self) -> FeedItem {
        let attr_number = |name: &str| self.attrs.get(name).and_then(|v| parse_number(v));
        let non_empty = |name: &str| self.attrs.get(name).filter(|v| !v.is_empty()).cloned();

        let seeders = attr_number("seeders");
        let leechers = match attr_number("peers") {
            Some(peers) => Some(peers - seeders.unwrap_or(0)),
            None => attr_number("leechers"),
        };

        let size_bytes = attr_number("size")
            .or_else(|| parse_number(&self.size))
            .and_then(|s| u64::try_from(s).ok());

        FeedItem {
            title: non_blank(&self.title).unwrap_or_else(|| "(no title)".to_string()),
            guid: non_blank(&self.guid),
            link: non_blank(&self.link).or(self.enclosure.clone()),
            magnet: self.magnet.clone(),
            info_hash: non_empty("infohash").map(|h| h.to_uppercase()),
            size_bytes,
            seeders,
            leechers,
            published_at: parse_pub_date(self.pub_date.trim()),
            quality: non_empty("quality"),
            category: non_empty("category"),
            external_score: None,
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

fn parse_number(value: &str) -> Option<i64> {
    let value = value.trim();
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
}

fn parse_pub_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:torznab="http://torznab.com/schemas/2015/feed">
<channel>
  <title>Jackett</title>
  <item>
    <title>Pink Floyd - The Wall (1979) [FLAC]</title>
    <guid>https://tracker.example/viewtopic.php?t=123</guid>
    <link>http://jackett:9117/dl/rutracker/?jackett_apikey=k&amp;path=abc&amp;file=The+Wall</link>
    <pubDate>Mon, 03 Jun 2024 10:00:00 +0000</pubDate>
    <size>734003200</size>
    <torznab:attr name="seeders" value="42" />
    <torznab:attr name="peers" value="50" />
    <torznab:attr name="category" value="3040" />
    <torznab:attr name="infohash" value="c12fe1c06bba254a9dc9f519b335aa7c1367a88a" />
  </item>
  <item>
    <title><![CDATA[Кино - Группа крови]]></title>
    <enclosure url="http://jackett/dl/2?x=1&amp;y=2" length="1" type="application/x-bittorrent" />
    <torznab:attr name="magneturl" value="magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&amp;dn=kino" />
    <torznab:attr name="size" value="1000" />
    <torznab:attr name="leechers" value="3" />
  </item>
  <item>
    <guid>no-title</guid>
  </item>
</channel>
</rss>"#;

    #[test]
    fn test_parse_full_item() {
        let items = parse_feed(FEED);
        assert_eq!(items.len(), 3);

        let first = &items[0];
        assert_eq!(first.title, "Pink Floyd - The Wall (1979) [FLAC]");
        assert_eq!(
            first.guid.as_deref(),
            Some("https://tracker.example/viewtopic.php?t=123")
        );
        assert_eq!(
            first.link.as_deref(),
            Some("http://jackett:9117/dl/rutracker/?jackett_apikey=k&path=abc&file=The+Wall")
        );
        assert_eq!(first.seeders, Some(42));
        assert_eq!(first.leechers, Some(8));
        assert_eq!(first.size_bytes, Some(734003200));
        assert_eq!(first.category.as_deref(), Some("3040"));
        assert_eq!(
            first.info_hash.as_deref(),
            Some("C12FE1C06BBA254A9DC9F519B335AA7C1367A88A")
        );
        assert_eq!(
            first.published_at,
            Some(Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap())
        );
        assert_eq!(first.magnet, None);
    }

    #[test]
    fn test_parse_enclosure_magnet_and_cdata() {
        let items = parse_feed(FEED);
        let second = &items[1];
        assert_eq!(second.title, "Кино - Группа крови");
        assert_eq!(second.link.as_deref(), Some("http://jackett/dl/2?x=1&y=2"));
        assert_eq!(
            second.magnet.as_deref(),
            Some("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=kino")
        );
        assert_eq!(second.size_bytes, Some(1000));
        assert_eq!(second.leechers, Some(3));
        assert_eq!(second.seeders, None);
    }

    #[test]
    fn test_missing_title() {
        let items = parse_feed(FEED);
        assert_eq!(items[2].title, "(no title)");
        assert_eq!(items[2].guid.as_deref(), Some("no-title"));
    }

    #[test]
    fn test_empty_feed() {
        assert!(parse_feed("<rss><channel></channel></rss>").is_empty());
        assert!(parse_feed("not xml at all").is_empty());
    }

    #[test]
    fn test_magnet_in_cdata_stops_at_section_end() {
        let xml = r#"<rss><channel><item>
            <title>Album</title>
            <link><![CDATA[magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=Album]]></link>
        </item><item>
            <title>Other</title>
            <description><![CDATA[Get it: magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567]]></description>
        </item></channel></rss>"#;

        let items = parse_feed(xml);
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].magnet.as_deref(),
            Some("magnet:?xt=urn:btih:ABCDEF0123456789ABCDEF0123456789ABCDEF01&dn=Album")
        );
        assert_eq!(items[0].link, items[0].magnet);
        assert_eq!(
            items[1].magnet.as_deref(),
            Some("magnet:?xt=urn:btih:0123456789ABCDEF0123456789ABCDEF01234567")
        );
    }

    #[test]
    fn test_attrs_in_any_order_and_numeric_entities() {
        let xml = r#"<rss xmlns:torznab="http://torznab.com/schemas/2015/feed"><channel><item>
            <title>&#1050;&#x438;no &amp; Friends &lt;Live&gt;</title>
            <torznab:attr value="12" name="Seeders"/>
            <torznab:attr value="20" name="peers"></torznab:attr>
            <torznab:attr type="x" value="2.5E3" name="size"/>
        </item></channel></rss>"#;

        let items = parse_feed(xml);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "Киno & Friends <Live>");
        assert_eq!(items[0].seeders, Some(12));
        assert_eq!(items[0].leechers, Some(8));
        assert_eq!(items[0].size_bytes, Some(2500));
    }

    #[test]
    fn test_sloppy_feed_keeps_items() {
        // Raw ampersand in the link, and the feed is cut off mid-item.
        let xml = r#"<rss><channel><item>
            <title>First</title>
            <link>http://jackett/dl/1?a=1&b=2</link>
        </item><item>
            <title>Second</title>
            <size>42</size>"#;

        let items = parse_feed(xml);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].link.as_deref(), Some("http://jackett/dl/1?a=1&b=2"));
        assert_eq!(items[1].title, "Second");
        assert_eq!(items[1].size_bytes, Some(42));
    }
}
