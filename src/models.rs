/// One entry of the news listing, as extracted from the page's embedded record set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsRecord {
    pub title: String,
    pub url: String, // always absolute once it leaves the extractor
    pub date: String, // free-form label such as "2024-05-17"
}
