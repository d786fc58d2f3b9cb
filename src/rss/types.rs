//! Feed document types.

/// A decoded feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    /// Channel title.
    pub title: String,
    /// Items in document order.
    pub items: Vec<ParsedItem>,
}

/// One item of a feed document, as published.
///
/// The publication date is kept as the raw source string; it is parsed at
/// persistence time so that a bad date only drops its own item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    /// Item title.
    pub title: String,
    /// Item description/body.
    pub description: String,
    /// Raw `pubDate` string.
    pub pub_date: String,
    /// Link to the original article.
    pub link: String,
}

/// An item tagged with the id of the feed it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedItem {
    /// Owning feed id.
    pub feed_id: i64,
    /// The item itself.
    pub item: ParsedItem,
}
