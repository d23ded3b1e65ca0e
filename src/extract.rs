// =============================================================================
// extract.rs — THE MARKUP ARCHAEOLOGY DEPARTMENT
// =============================================================================
//
// Court portal HTML is not a document format. It is a crime scene. Tables
// inside tables, bold tags doing the job of headers, fields that are
// sometimes a <td> pair and sometimes a bare "Label: value" floating in a
// <div>, entity-encoded everything. There is no grammar to parse, only
// patterns to recognize.
//
// So this module doesn't parse. It recognizes. Every field is extracted by
// trying a fixed list of structural patterns IN ORDER and taking the first
// hit. The order is not aesthetic — it's ranked by how often each shape
// actually appears on the real portals, and a page frequently contains more
// than one candidate match. Reorder the list and you change which one wins.
// Don't reorder the list.
// =============================================================================

use memchr::memmem;
use regex::Regex;
use std::sync::LazyLock;

/// Anything that looks like a tag. The [^>]* is load-bearing: portal markup
/// contains unclosed attributes that would send a greedy match to the end
/// of the document.
static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag-strip regex is invalid somehow"));

/// Numeric character references, decimal and hex.
static NUMERIC_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(?:x([0-9a-fA-F]{1,6})|([0-9]{1,7}));")
        .expect("numeric-entity regex is invalid somehow")
});

/// Runs of whitespace (the portals love a good twelve-space indent inside
/// a value cell).
static WS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace regex is invalid somehow"));

/// First cells that mark a header row rather than data. Lowercase,
/// matched by prefix. Deliberately blunt: we would rather drop a weird
/// row than present "Sl. No." to a user as a hearing date.
const HEADER_CELL_BLACKLIST: &[&str] = &[
    "sl", "sr", "s.no", "s. no", "serial", "date", "judge", "business",
    "purpose", "order", "hearing", "cause", "no.",
];

/// Strip every tag from a markup fragment, leaving the text.
/// `<br>` and table-cell boundaries become spaces so adjacent values don't
/// fuse into one word.
pub fn strip_tags(markup: &str) -> String {
    TAG_RE.replace_all(markup, " ").into_owned()
}

/// Decode the HTML entities the portals actually emit. Not a full spec
/// implementation — a full spec implementation would imply the portals
/// follow a spec.
pub fn decode_entities(text: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(text, |caps: &regex::Captures<'_>| {
        let parsed = if let Some(hex) = caps.get(1) {
            u32::from_str_radix(hex.as_str(), 16).ok()
        } else {
            caps.get(2).and_then(|d| d.as_str().parse::<u32>().ok())
        };
        parsed
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    numeric
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        // Ampersand last, or "&amp;nbsp;" double-decodes. Ask us how we know.
        .replace("&amp;", "&")
}

/// Full cleanup for an extracted value: tags out, entities decoded,
/// whitespace collapsed, trimmed.
pub fn clean_fragment(markup: &str) -> String {
    let stripped = strip_tags(markup);
    let decoded = decode_entities(&stripped);
    WS_RE.replace_all(&decoded, " ").trim().to_string()
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Extract a labelled field from a markup fragment.
///
/// Patterns tried in order, first non-empty cleaned match wins:
///   1. Table-cell pair:       <td>Label</td><td>value</td>
///   2. Bold/strong label:     <b>Label:</b> value
///   3. Definition list:       <dt>Label</dt><dd>value</dd>
///   4. Plain text:            Label: value
///
/// Returns an empty string when nothing matches. An empty string is not an
/// error — it's a field the portal didn't print today. The presentation
/// layer turns it into "Not available"; we just don't invent data.
pub fn extract_field(markup: &str, label: &str) -> String {
    if markup.is_empty() || label.trim().is_empty() || !contains_ci(markup, label) {
        return String::new();
    }

    let lab = regex::escape(label.trim());

    // Built per call because the label is dynamic. The construction cost is
    // noise next to the 15-second portal round trip that produced the markup.
    let patterns = [
        // 1. <td>Label</td><td>value</td> — the label cell may wrap the text
        //    in <b>/<font>/whatever, and may or may not carry a colon.
        format!(
            r"(?is)<td[^>]*>\s*(?:<[^>]+>\s*)*{lab}\s*:?\s*(?:</[^>]+>\s*)*</td>\s*<td[^>]*>(.*?)</td>"
        ),
        // 2. <b>Label</b>: value — value runs to the next tag.
        format!(
            r"(?is)<(?:b|strong)[^>]*>\s*{lab}\s*:?\s*</(?:b|strong)>\s*:?\s*([^<]+)"
        ),
        // 3. <dt>Label</dt><dd>value</dd>
        format!(
            r"(?is)<dt[^>]*>\s*(?:<[^>]+>\s*)*{lab}\s*:?\s*(?:</[^>]+>\s*)*</dt>\s*<dd[^>]*>(.*?)</dd>"
        ),
        // 4. Bare "Label: value" text — value runs to the next tag or line end.
        format!(r"(?i){lab}\s*:\s*([^<\r\n]+)"),
    ];

    for pattern in &patterns {
        let re = match Regex::new(pattern) {
            Ok(re) => re,
            // An escaped label can't produce an invalid pattern, but we're
            // not going to panic over markup either way.
            Err(_) => continue,
        };
        if let Some(caps) = re.captures(markup) {
            if let Some(m) = caps.get(1) {
                let cleaned = clean_fragment(m.as_str());
                if !cleaned.is_empty() {
                    return cleaned;
                }
            }
        }
    }

    String::new()
}

/// Extract the rows of the first table that follows a heading containing
/// any of `heading_keywords` (case-insensitive).
///
/// Each row comes back as its cleaned cell texts. Header rows — any row
/// whose first cell starts with a blacklisted label like "Sl", "Date",
/// "Judge" — are skipped, as are empty rows. If no heading matches, or no
/// table follows it, you get an empty vec and we all move on with our lives.
pub fn extract_table_rows(markup: &str, heading_keywords: &[&str]) -> Vec<Vec<String>> {
    let lower = markup.to_lowercase();

    // Earliest occurrence of any keyword marks the section start.
    let section_start = heading_keywords
        .iter()
        .filter_map(|kw| lower.find(&kw.to_lowercase()))
        .min();
    let Some(start) = section_start else {
        return Vec::new();
    };

    // First <table> at or after the heading. memmem gives us SIMD byte
    // scanning for a job a for loop could do, which is exactly our style.
    let Some(table_rel) = memmem::find(lower[start..].as_bytes(), b"<table") else {
        return Vec::new();
    };
    let table_start = start + table_rel;
    let table_end = memmem::find(lower[table_start..].as_bytes(), b"</table>")
        .map(|rel| table_start + rel)
        .unwrap_or(markup.len());
    let table = &markup[table_start..table_end];

    let mut rows = Vec::new();
    // Split on <tr. The chunk before the first <tr is the <table ...> tag
    // itself and produces no cells, so it falls out naturally.
    for raw_row in table.split("<tr").skip(1) {
        let row_body = raw_row
            .split_once('>')
            .map(|(_, rest)| rest)
            .unwrap_or(raw_row);

        let mut cells = Vec::new();
        for raw_cell in split_cells(row_body) {
            cells.push(clean_fragment(&raw_cell));
        }

        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }

        let first = cells[0].to_lowercase();
        if HEADER_CELL_BLACKLIST.iter().any(|kw| first.starts_with(kw)) {
            continue;
        }

        rows.push(cells);
    }

    rows
}

/// Split a row body into its <td>/<th> cell bodies.
fn split_cells(row_body: &str) -> Vec<String> {
    let lower = row_body.to_lowercase();
    let mut cells = Vec::new();
    let mut pos = 0;

    loop {
        let td = memmem::find(lower[pos..].as_bytes(), b"<td");
        let th = memmem::find(lower[pos..].as_bytes(), b"<th");
        let next = match (td, th) {
            (Some(a), Some(b)) => pos + a.min(b),
            (Some(a), None) => pos + a,
            (None, Some(b)) => pos + b,
            (None, None) => break,
        };
        let body_start = match lower[next..].find('>') {
            Some(rel) => next + rel + 1,
            None => break,
        };
        let close = memmem::find(lower[body_start..].as_bytes(), b"</td")
            .into_iter()
            .chain(memmem::find(lower[body_start..].as_bytes(), b"</th"))
            .min()
            .map(|rel| body_start + rel)
            .unwrap_or(row_body.len());

        cells.push(row_body[body_start..close].to_string());
        pos = close.max(body_start + 1);
        if pos >= row_body.len() {
            break;
        }
    }

    cells
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_cell_pattern_wins_first() {
        let markup = r#"
            <table><tr>
              <td><b>Case Status</b></td><td> DISPOSED </td>
            </tr></table>
            Case Status: something-else-entirely
        "#;
        // Both pattern 1 and pattern 4 match; pattern 1 is ranked higher.
        assert_eq!(extract_field(markup, "Case Status"), "DISPOSED");
    }

    #[test]
    fn bold_label_pattern() {
        let markup = "<b>Petitioner :</b> Ravi Kumar<br/><b>Respondent :</b> State";
        assert_eq!(extract_field(markup, "Petitioner"), "Ravi Kumar");
        assert_eq!(extract_field(markup, "Respondent"), "State");
    }

    #[test]
    fn definition_list_pattern() {
        let markup = "<dl><dt>Next Hearing</dt><dd>14-08-2025</dd></dl>";
        assert_eq!(extract_field(markup, "Next Hearing"), "14-08-2025");
    }

    #[test]
    fn plain_text_pattern_is_last_resort() {
        let markup = "<div>CNR Number: DLHC010012342023</div>";
        assert_eq!(extract_field(markup, "CNR Number"), "DLHC010012342023");
    }

    #[test]
    fn missing_label_yields_empty() {
        assert_eq!(extract_field("<td>Nothing here</td>", "Judge"), "");
        assert_eq!(extract_field("", "Judge"), "");
    }

    #[test]
    fn label_match_is_case_insensitive() {
        let markup = "<td>CASE STATUS</td><td>Pending</td>";
        assert_eq!(extract_field(markup, "Case Status"), "Pending");
    }

    #[test]
    fn value_is_stripped_decoded_and_collapsed() {
        let markup =
            "<td>Title</td><td>  <b>Ravi&nbsp;Kumar</b> &amp; Ors\n   vs <i>State</i>  </td>";
        assert_eq!(extract_field(markup, "Title"), "Ravi Kumar & Ors vs State");
    }

    #[test]
    fn entity_decoding_covers_numeric_refs() {
        assert_eq!(decode_entities("&#82;avi &#x4B;umar"), "Ravi Kumar");
        assert_eq!(decode_entities("A &amp; B"), "A & B");
        assert_eq!(decode_entities("&quot;quoted&quot;"), "\"quoted\"");
    }

    #[test]
    fn table_rows_skip_header_rows() {
        let markup = r#"
            <h3>Hearing History</h3>
            <table>
              <tr><th>Sl No</th><th>Date</th><th>Purpose</th></tr>
              <tr><td>1</td><td>10-01-2025</td><td>Arguments</td></tr>
              <tr><td>2</td><td>22-02-2025</td><td>Adjourned</td></tr>
            </table>
        "#;
        let rows = extract_table_rows(markup, &["hearing history", "case history"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec!["1", "10-01-2025", "Arguments"]);
        assert_eq!(rows[1], vec!["2", "22-02-2025", "Adjourned"]);
    }

    #[test]
    fn table_rows_without_heading_yield_nothing() {
        let markup = "<table><tr><td>1</td></tr></table>";
        assert!(extract_table_rows(markup, &["hearing history"]).is_empty());
    }

    #[test]
    fn table_rows_take_first_table_after_heading() {
        let markup = r#"
            <table><tr><td>decoy</td></tr></table>
            <h2>Orders</h2>
            <table><tr><td>15-03-2025</td><td>Order</td></tr></table>
        "#;
        let rows = extract_table_rows(markup, &["orders"]);
        assert_eq!(rows, vec![vec!["15-03-2025".to_string(), "Order".to_string()]]);
    }

    #[test]
    fn empty_rows_are_dropped() {
        let markup = r#"
            <h3>Orders</h3>
            <table>
              <tr><td> </td><td></td></tr>
              <tr><td>01-01-2025</td><td>Judgment</td></tr>
            </table>
        "#;
        let rows = extract_table_rows(markup, &["orders"]);
        assert_eq!(rows.len(), 1);
    }
}
