//! Bypass dataset parser
//!
//! The dataset is tab-separated text with a header row, columns `domain` and
//! `code`. Lines that do not yield both fields are dropped without error.

use crate::types::DatasetRecord;

/// Line counts from a parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Data lines seen (header excluded)
    pub lines: usize,
    pub records: usize,
    pub dropped: usize,
}

pub fn parse_dataset(text: &str) -> Vec<DatasetRecord> {
    parse_dataset_with_stats(text).0
}

pub fn parse_dataset_with_stats(text: &str) -> (Vec<DatasetRecord>, ParseStats) {
    let mut records = Vec::new();
    let mut stats = ParseStats::default();

    for line in text.trim().split('\n').skip(1) {
        stats.lines += 1;
        match parse_line(line) {
            Some(record) => records.push(record),
            None => stats.dropped += 1,
        }
    }

    stats.records = records.len();
    (records, stats)
}

fn parse_line(line: &str) -> Option<DatasetRecord> {
    let (domain, code) = line.split_once('\t')?;
    let domain = domain.trim();
    let code = code.trim();
    if domain.is_empty() || code.is_empty() {
        return None;
    }
    Some(DatasetRecord::new(domain, code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_discarded() {
        let records = parse_dataset("domain\tcode\na.com\tcode1\nb.com\tcode2");
        assert_eq!(
            records,
            vec![DatasetRecord::new("a.com", "code1"), DatasetRecord::new("b.com", "code2")]
        );
    }

    #[test]
    fn test_invalid_lines_dropped_in_order() {
        let text = "domain\tcode\n\
                    a.com\t<script src=x></script>\n\
                    no-tab-here\n\
                    \tcode-without-domain\n\
                    c.com\t   \n\
                    d.com\tcode4\n";
        let (records, stats) = parse_dataset_with_stats(text);
        assert_eq!(stats, ParseStats { lines: 5, records: 2, dropped: 3 });
        assert_eq!(records[0].domain, "a.com");
        assert_eq!(records[1].domain, "d.com");
    }

    #[test]
    fn test_fields_trimmed_and_split_on_first_tab() {
        let records = parse_dataset("domain\tcode\r\n  cdn.example.com \t alert(1)\t// tail \r\n");
        assert_eq!(records, vec![DatasetRecord::new("cdn.example.com", "alert(1)\t// tail")]);
    }

    #[test]
    fn test_duplicates_kept() {
        let records = parse_dataset("h\th\na.com\tx\na.com\tx");
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_header_only_or_empty() {
        assert!(parse_dataset("domain\tcode").is_empty());
        assert!(parse_dataset("").is_empty());
        assert!(parse_dataset("   \n  ").is_empty());
    }
}
