//! Reads product records out of rendered search and detail pages

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::warn;

use crate::models::{Field, ProductRecord};
use crate::traits::{SiteSelectors, parse_selector};

static RATING_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)"));
// Digit groups may be split by commas, dots, spaces or (narrow) no-break spaces
static COUNT_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(
        r"(?P<int>\d+(?:[,.\x{a0}\x{202f} ]\d{3})*)(?P<frac>[.,]\d+)?(?:\s*(?P<suffix>[KkMm])\b)?",
    )
});

fn pattern(re: &'static LazyLock<Result<Regex, regex::Error>>) -> Result<&'static Regex> {
    LazyLock::force(re)
        .as_ref()
        .map_err(|e| anyhow::anyhow!("invalid pattern: {e}"))
}

/// Records read from one results page
#[derive(Debug, Default)]
pub struct Extraction {
    pub records: Vec<ProductRecord>,
    /// Result nodes that were skipped because a field could not be parsed
    pub errors: usize,
}

struct ProductSelectors {
    container: Selector,
    title: Selector,
    price: Selector,
    link: Selector,
    image: Selector,
    rating: Selector,
}

impl ProductSelectors {
    fn parse(selectors: &SiteSelectors) -> Result<Self> {
        Ok(Self {
            container: parse_selector("product container", &selectors.product_container)?,
            title: parse_selector("title", &selectors.title)?,
            price: parse_selector("price", &selectors.price)?,
            link: parse_selector("link", &selectors.link)?,
            image: parse_selector("image", &selectors.image)?,
            rating: parse_selector("rating", &selectors.rating)?,
        })
    }
}

/// Extract up to `cap` product records from a results page
pub fn extract_products(html: &str, selectors: &SiteSelectors, cap: usize) -> Result<Extraction> {
    let selectors = ProductSelectors::parse(selectors)?;
    let document = Html::parse_document(html);

    let mut extraction = Extraction::default();
    for (index, node) in document.select(&selectors.container).take(cap).enumerate() {
        match extract_record(node, &selectors) {
            Ok(record) => extraction.records.push(record),
            Err(e) => {
                warn!("Skipping product {}: {:#}", index, e);
                extraction.errors += 1;
            }
        }
    }

    Ok(extraction)
}

fn extract_record(node: ElementRef<'_>, selectors: &ProductSelectors) -> Result<ProductRecord> {
    let (rating, review_count) = match first_text(node, &selectors.rating) {
        Some(text) => parse_rating(&text)?,
        None => (Field::Unavailable, Field::Unavailable),
    };

    Ok(ProductRecord {
        title: first_text(node, &selectors.title).into(),
        price: first_text(node, &selectors.price).into(),
        link: first_attr(node, &selectors.link, "href").into(),
        image: first_attr(node, &selectors.image, "src").into(),
        rating,
        review_count,
        description: Field::Unavailable,
    })
}

fn first_text(node: ElementRef<'_>, selector: &Selector) -> Option<String> {
    node.select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
}

fn first_attr(node: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    node.select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(str::to_string)
}

/// Split rating text such as `4,5 (1,234)` into a rating and a review count.
///
/// The rating is the leading decimal number; the review count is the last
/// number after it. Abbreviated counts (`1.2K`) are scaled. A rating element
/// whose text has no leading number is an error.
pub fn parse_rating(text: &str) -> Result<(Field<f64>, Field<i64>)> {
    let captures = pattern(&RATING_RE)?
        .captures(text)
        .with_context(|| format!("rating text {text:?} has no leading number"))?;
    let number = &captures[1];
    let rating: f64 = number
        .replace(',', ".")
        .parse()
        .with_context(|| format!("invalid rating {number:?}"))?;

    let rest = &text[captures[0].len()..];
    let review_count = match pattern(&COUNT_RE)?.captures_iter(rest).last() {
        Some(count) => parse_count(&count),
        None => Field::Unavailable,
    };

    Ok((Field::Value(rating), review_count))
}

fn parse_count(count: &regex::Captures<'_>) -> Field<i64> {
    let digits: String = count["int"].chars().filter(char::is_ascii_digit).collect();
    let frac = count.name("frac").map(|m| &m.as_str()[1..]);
    let scale = match count.name("suffix").map(|m| m.as_str()) {
        Some("K" | "k") => 1_000.0,
        Some("M" | "m") => 1_000_000.0,
        _ => {
            // A fractional count without a unit is not a count
            if frac.is_some() {
                return Field::Unavailable;
            }
            return digits.parse().map_or(Field::Unavailable, Field::Value);
        }
    };

    let number = match frac {
        Some(frac) => format!("{digits}.{frac}"),
        None => digits,
    };
    number
        .parse::<f64>()
        .map_or(Field::Unavailable, |n| Field::Value((n * scale).round() as i64))
}

/// Read the description text from a product detail page
pub fn extract_description(html: &str, selector: &str) -> Result<Field<String>> {
    let selector = parse_selector("description", selector)?;
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .next()
        .map_or(Field::Unavailable, |el| {
            Field::non_empty(&el.text().collect::<String>())
        }))
}
