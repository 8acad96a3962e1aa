use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector, node::Element};

use crate::schema::{Locator, Normalization, Schema};
use crate::types::{Dataset, DatasetError, Record};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid card selector '{0}': {1}")]
    Selector(String, String),
    #[error("Unreadable current page indicator: {0:?}")]
    PageIndicator(String),
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

static RE_NON_DIGIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\D").expect("invalid regex: non digit"));

static CURRENT_PAGE_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        "span.b-pagination-vuetify-imitation__item.b-pagination-vuetify-imitation__item_current",
    )
    .expect("invalid selector: current page")
});

fn elem_text(element: ElementRef) -> String {
    element.text().collect::<String>()
}

fn trim_border(text: &str) -> &str {
    text.trim_matches(|c| c == '\n' || c == ' ')
}

pub fn normalize(raw: &str, rule: Option<Normalization>) -> String {
    let text = trim_border(raw);
    match rule {
        None => text.to_string(),
        Some(Normalization::DigitsOnly) => RE_NON_DIGIT.replace_all(text, "").into_owned(),
        Some(Normalization::CommaList) => text.split(',').map(str::trim).collect::<Vec<_>>().join(", "),
    }
}

fn attr_matches(element: &Element, name: &str, expected: &str) -> bool {
    if name == "class" && !expected.contains(char::is_whitespace) {
        return element.classes().any(|c| c == expected);
    }
    match element.attr(name) {
        Some(actual) if name == "class" => actual.split_whitespace().eq(expected.split_whitespace()),
        Some(actual) => actual == expected,
        None => false,
    }
}

fn locator_matches(element: &Element, locator: &Locator) -> bool {
    element.name() == locator.tag
        && locator
            .attrs
            .iter()
            .all(|(name, expected)| attr_matches(element, name, expected))
}

/// First descendant of `fragment` (the fragment itself excluded) matching
/// `locator`, in document order.
pub fn find_first<'a>(fragment: ElementRef<'a>, locator: &Locator) -> Option<ElementRef<'a>> {
    fragment
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .find(|e| locator_matches(e.value(), locator))
}

fn card_selector(schema: &Schema) -> Result<Selector, ParseError> {
    let css = schema.card.css();
    Selector::parse(&css).map_err(|e| ParseError::Selector(css.clone(), e.to_string()))
}

fn extract_record(card: ElementRef, schema: &Schema) -> Record {
    schema
        .fields
        .iter()
        .map(|field| {
            find_first(card, &field.locator).map(|e| normalize(&elem_text(e), field.rule))
        })
        .collect()
}

fn records_from_document(document: &Html, schema: &Schema) -> Result<Dataset, ParseError> {
    let card_sel = card_selector(schema)?;
    let mut dataset = Dataset::new(schema.columns());
    for card in document.select(&card_sel) {
        dataset.push(extract_record(card, schema))?;
    }
    log::debug!("Parsed {} card(s) as {}", dataset.len(), schema.card.css());
    Ok(dataset)
}

fn current_page_of(document: &Html) -> Result<u32, ParseError> {
    match document.select(&CURRENT_PAGE_SEL).next() {
        None => Ok(1),
        Some(e) => {
            let text = elem_text(e);
            text.trim()
                .parse::<u32>()
                .map_err(|_| ParseError::PageIndicator(text))
        }
    }
}

/// Every card of `schema`'s kind on the page, one record per card, fields in
/// schema order. Cards where no locator matches still yield a record.
pub fn parse_records(html: &str, schema: &Schema) -> Result<Dataset, ParseError> {
    records_from_document(&Html::parse_document(html), schema)
}

/// Page number the site reports as current; a page without a pagination
/// widget is page 1.
pub fn parse_current_page(html: &str) -> Result<u32, ParseError> {
    current_page_of(&Html::parse_document(html))
}
