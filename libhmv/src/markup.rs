use crate::machine::{Level, MachineRecord};
use crate::writeup::WriteupRecord;
use crate::Endpoints;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use url::Url;

lazy_static! {
    static ref MACHINE_ROW: Selector =
        Selector::parse("table.mt-1.table.table-striped.table-dark tbody tr").unwrap();
    static ref MACHINE_NAME: Selector = Selector::parse("h4.vmname").unwrap();
    static ref DIFFICULTY_BORDER: Selector = Selector::parse(r#"div[style*="border-top"]"#).unwrap();
    static ref STATUS_BADGE: Selector = Selector::parse("span.badge").unwrap();
    static ref PAGE_INDICATOR: Selector = Selector::parse(
        "body > div.container-xxl > div > div.col-10 > div > div > div.container > nav > ul > li:nth-child(5) > a"
    )
    .unwrap();
    static ref ROW: Selector = Selector::parse("tr").unwrap();
    static ref CELL: Selector = Selector::parse("td").unwrap();
    static ref ANCHOR: Selector = Selector::parse("a").unwrap();
    static ref IMAGE: Selector = Selector::parse("img").unwrap();
}

/// A row the parser had to give up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Zero based position among the rows considered
    pub row: usize,
    pub reason: String,
}

/// Outcome of best-effort row parsing: what could be extracted plus what
/// could not. Callers decide what an empty `items` means.
#[derive(Debug)]
pub struct Parsed<T> {
    pub items: Vec<T>,
    pub failures: Vec<RowError>,
}

impl<T> Parsed<T> {
    fn new() -> Self {
        Parsed {
            items: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn log_failures(&self, what: &str) {
        for failure in self.failures.iter() {
            tracing::warn!("Skipping {} row {} : {}", what, failure.row, failure.reason);
        }
    }
}

/// Everything that depends on the exact shape of the site's HTML.
pub trait MarkupParser: Send + Sync {
    fn machine_rows(&self, html: &str, endpoints: &Endpoints) -> Parsed<MachineRecord>;
    /// Total page count from the pagination widget, if it can be read.
    fn total_pages(&self, html: &str) -> Option<u32>;
    fn writeup_rows(&self, html: &str, endpoints: &Endpoints) -> Parsed<WriteupRecord>;
}

/// Parser for the markup hackmyvm.eu currently serves.
#[derive(Debug, Default, Clone, Copy)]
pub struct HmvMarkup;

impl MarkupParser for HmvMarkup {
    fn machine_rows(&self, html: &str, endpoints: &Endpoints) -> Parsed<MachineRecord> {
        let document = Html::parse_document(html);
        let mut parsed = Parsed::new();
        for (row_idx, row) in document.select(&MACHINE_ROW).enumerate() {
            match machine_from_row(row, endpoints) {
                Ok(machine) => parsed.items.push(machine),
                Err(reason) => parsed.failures.push(RowError {
                    row: row_idx,
                    reason,
                }),
            }
        }
        parsed
    }

    fn total_pages(&self, html: &str) -> Option<u32> {
        let document = Html::parse_document(html);
        let indicator = trimmed_text(document.select(&PAGE_INDICATOR).next()?);
        let (_, total) = indicator.split_once('/')?;
        total.trim().parse::<u32>().ok().filter(|total| *total > 0)
    }

    fn writeup_rows(&self, html: &str, endpoints: &Endpoints) -> Parsed<WriteupRecord> {
        let document = Html::parse_document(html);
        let mut parsed = Parsed::new();
        for (row_idx, row) in document.select(&ROW).enumerate() {
            let cells: Vec<ElementRef> = row.select(&CELL).collect();
            if cells.len() < 4 {
                continue;
            }
            match writeup_from_cells(&cells, &endpoints.base) {
                Ok(Some(writeup)) => parsed.items.push(writeup),
                Ok(None) => continue,
                Err(reason) => parsed.failures.push(RowError {
                    row: row_idx,
                    reason,
                }),
            }
        }
        parsed
    }
}

fn machine_from_row(row: ElementRef, endpoints: &Endpoints) -> Result<MachineRecord, String> {
    let name = row
        .select(&MACHINE_NAME)
        .next()
        .map(trimmed_text)
        .filter(|name| !name.is_empty())
        .ok_or("missing machine name")?;
    let style = row
        .select(&DIFFICULTY_BORDER)
        .next()
        .and_then(|div| div.value().attr("style"))
        .ok_or(format!("missing difficulty border for {name}"))?;
    // e.g. "border-top: 5px solid #28a745;"
    let color = style
        .rsplit("solid")
        .next()
        .unwrap_or_default()
        .trim()
        .trim_end_matches(';');
    let status = row
        .select(&STATUS_BADGE)
        .next()
        .map(trimmed_text)
        .unwrap_or_else(|| "?".to_string());
    let creator = row
        .select(&CELL)
        .nth(1)
        .map(trimmed_text)
        .ok_or(format!("missing creator cell for {name}"))?;
    Ok(MachineRecord {
        link: endpoints.machine_link(&name),
        level: Level::from_border_color(color),
        name,
        status,
        creator,
    })
}

/// `Ok(None)` for header rows and rows without a machine name.
fn writeup_from_cells(cells: &[ElementRef], base: &Url) -> Result<Option<WriteupRecord>, String> {
    let machine_link = cells[0].select(&ANCHOR).next();
    let machine_name = match machine_link {
        Some(a) => stripped_text(a),
        None => stripped_text(cells[0]),
    };
    if machine_name.is_empty() || machine_name == "Machine" || machine_name == "machine" {
        return Ok(None);
    }
    let machine_url = match machine_link {
        Some(a) => resolve(base, a.value().attr("href").unwrap_or(""))?,
        None => String::new(),
    };

    let author_link = cells[1].select(&ANCHOR).next();
    let author_name = match author_link {
        Some(a) => stripped_text(a),
        None => stripped_text(cells[1]),
    };
    let author_url = match author_link {
        Some(a) => resolve(base, a.value().attr("href").unwrap_or(""))?,
        None => String::new(),
    };

    // First image is the avatar, second the country flag.
    let images: Vec<ElementRef> = cells[1].select(&IMAGE).collect();
    let image_url = |idx: usize| match images.get(idx) {
        Some(img) => resolve(base, img.value().attr("src").unwrap_or("")),
        None => Ok(String::new()),
    };
    let avatar_url = image_url(0)?;
    let country_flag = image_url(1)?;

    let language = stripped_text(cells[2]);
    let writeup_href = cells[3]
        .select(&ANCHOR)
        .next()
        .and_then(|a| a.value().attr("href"))
        .unwrap_or("");
    let writeup_url = if writeup_href.is_empty()
        || writeup_href.starts_with("http")
        || writeup_href.starts_with("//")
    {
        writeup_href.to_string()
    } else {
        resolve(base, writeup_href)?
    };

    Ok(Some(WriteupRecord {
        machine_name,
        machine_url,
        author_name,
        author_url,
        avatar_url,
        country_flag,
        language,
        writeup_url,
    }))
}

fn resolve(base: &Url, link: &str) -> Result<String, String> {
    base.join(link)
        .map(String::from)
        .map_err(|e| format!("invalid link {link} : {e}"))
}

fn trimmed_text(element: ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Every text node trimmed, empty ones dropped, the rest concatenated.
fn stripped_text(element: ElementRef) -> String {
    element.text().map(str::trim).collect()
}
