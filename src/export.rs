//! Paginated layout of the class-wise report for PDF export.
//!
//! The UI owns the actual PDF drawing. This module decides what goes on which
//! page: one section per class, a three-column table per section, page
//! breaks where content would cross the bottom margin.

use crate::report::{compare_standards, ClassWiseReport};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FILE_NAME: &str = "Class_Wise_Report.pdf";
pub const COLUMNS: [&str; 3] = ["Student", "Subject", "Marks"];

/// Page geometry in millimetres (A4 portrait).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageGeometry {
    pub page_height: f64,
    pub top: f64,
    pub bottom_margin: f64,
    pub heading_advance: f64,
    pub row_height: f64,
    pub section_gap: f64,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_height: 297.0,
            top: 20.0,
            bottom_margin: 20.0,
            heading_advance: 6.0,
            row_height: 8.0,
            section_gap: 10.0,
        }
    }
}

impl PageGeometry {
    fn limit(&self) -> f64 {
        self.page_height - self.bottom_margin
    }

    /// Heading, header row, body rows and trailing gap.
    fn estimated_height(&self, rows: usize) -> f64 {
        10.0 + rows as f64 * self.row_height + 15.0
    }
}

/// Font the renderer must register before drawing headings, e.g. a
/// Devanagari face for localized class headings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FontRegistration {
    pub family: String,
    pub source: String,
    #[serde(default)]
    pub script: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayoutOptions {
    pub geometry: PageGeometry,
    pub heading_prefix: String,
    pub heading_font: Option<FontRegistration>,
    pub file_name: String,
}

impl Default for LayoutOptions {
    fn default() -> Self {
        Self {
            geometry: PageGeometry::default(),
            heading_prefix: "Class".to_string(),
            heading_font: None,
            file_name: DEFAULT_FILE_NAME.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    pub name: String,
    pub subject: String,
    pub marks: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    pub standard: String,
    pub heading: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading_font: Option<String>,
    /// True when this is the tail of a table that started on an earlier page.
    pub continued: bool,
    pub heading_y: f64,
    pub table_y: f64,
    pub end_y: f64,
    pub rows: Vec<TableRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportPage {
    pub number: usize,
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDocument {
    pub file_name: String,
    pub geometry: PageGeometry,
    pub columns: [&'static str; 3],
    pub fonts: Vec<FontRegistration>,
    pub pages: Vec<ReportPage>,
}

impl ReportDocument {
    pub fn section_count(&self) -> usize {
        self.pages.iter().map(|p| p.sections.len()).sum()
    }
}

struct Cursor {
    pages: Vec<ReportPage>,
    y: f64,
    top: f64,
}

impl Cursor {
    fn page_is_empty(&self) -> bool {
        self.pages
            .last()
            .map(|p| p.sections.is_empty())
            .unwrap_or(true)
    }

    fn new_page(&mut self) {
        let number = self.pages.len() + 1;
        self.pages.push(ReportPage {
            number,
            sections: Vec::new(),
        });
        self.y = self.top;
    }

    fn push(&mut self, section: ReportSection) {
        if let Some(page) = self.pages.last_mut() {
            page.sections.push(section);
        }
    }
}

pub fn layout_class_report(report: &ClassWiseReport, opts: &LayoutOptions) -> ReportDocument {
    let g = opts.geometry;
    let mut cursor = Cursor {
        pages: Vec::new(),
        y: g.top,
        top: g.top,
    };
    cursor.new_page();

    let mut standards: Vec<&String> = report.keys().collect();
    standards.sort_by(|a, b| compare_standards(a, b));

    let heading_font = opts.heading_font.as_ref().map(|f| f.family.clone());

    for standard in standards {
        let rows: Vec<TableRow> = report[standard]
            .iter()
            .map(|r| TableRow {
                name: r.name.clone(),
                subject: r.subject.clone(),
                marks: r.marks.to_string(),
            })
            .collect();

        if cursor.y + g.estimated_height(rows.len()) > g.limit() && !cursor.page_is_empty() {
            cursor.new_page();
        }

        let heading = format!("{} {}", opts.heading_prefix, standard);
        let mut pending = rows.as_slice();
        let mut continued = false;

        loop {
            let heading_y = cursor.y;
            let table_y = heading_y + g.heading_advance;
            // Header row is repeated on every page the table touches.
            let space = ((g.limit() - table_y - g.row_height) / g.row_height).floor();
            let fit = if space < 1.0 { 0 } else { space as usize };

            if fit == 0 && !pending.is_empty() && !cursor.page_is_empty() {
                cursor.new_page();
                continue;
            }
            // A page too short for even one row still has to make progress.
            let take = fit.max(1).min(pending.len());

            let (now, rest) = pending.split_at(take);
            let end_y = table_y + g.row_height * (now.len() + 1) as f64;
            cursor.push(ReportSection {
                standard: standard.clone(),
                heading: if continued {
                    format!("{} (cont.)", heading)
                } else {
                    heading.clone()
                },
                heading_font: heading_font.clone(),
                continued,
                heading_y,
                table_y,
                end_y,
                rows: now.to_vec(),
            });
            cursor.y = end_y + g.section_gap;

            if rest.is_empty() {
                break;
            }
            pending = rest;
            continued = true;
            cursor.new_page();
        }
    }

    ReportDocument {
        file_name: opts.file_name.clone(),
        geometry: g,
        columns: COLUMNS,
        fonts: opts.heading_font.iter().cloned().collect(),
        pages: cursor.pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Mark, MarkStatus, Student, Test};
    use crate::report::project;
    use chrono::NaiveDate;

    fn class_report(sizes: &[(&str, usize)]) -> ClassWiseReport {
        let date = NaiveDate::from_ymd_opt(2026, 3, 14).expect("date");
        let mut tests = Vec::new();
        let mut students = Vec::new();
        for (std, n) in sizes {
            tests.push(Test {
                id: format!("t-{}", std),
                standard: std.to_string(),
                subject: "Maths".into(),
                test_date: date,
                total_marks: 10.0,
            });
            for i in 0..*n {
                students.push(Student {
                    id: format!("{}-{}", std, i),
                    name: format!("Student {}-{}", std, i),
                    standard: std.to_string(),
                    subjects: vec![],
                });
            }
        }
        let marks = vec![Mark {
            id: "m1".into(),
            student_id: students.first().map(|s| s.id.clone()).unwrap_or_default(),
            test_id: tests.first().map(|t| t.id.clone()).unwrap_or_default(),
            status: MarkStatus::Absent,
            obtained_marks: None,
        }];
        project(&tests, &marks, &students)
    }

    #[test]
    fn small_classes_share_a_page_in_numeric_order() {
        let report = class_report(&[("8", 3), ("2", 2), ("5", 4)]);
        let doc = layout_class_report(&report, &LayoutOptions::default());
        assert_eq!(doc.pages.len(), 1);
        let headings: Vec<&str> = doc.pages[0]
            .sections
            .iter()
            .map(|s| s.heading.as_str())
            .collect();
        assert_eq!(headings, vec!["Class 2", "Class 5", "Class 8"]);

        let first = &doc.pages[0].sections[0];
        assert_eq!(first.heading_y, 20.0);
        assert_eq!(first.table_y, 26.0);
        assert_eq!(first.rows[0].marks, "-");
        // The only mark in the fixture is an absence in the first class built.
        assert_eq!(doc.pages[0].sections[2].rows[0].marks, "ABSENT");
        assert_eq!(doc.pages[0].sections[1].heading_y, first.end_y + 10.0);
        assert_eq!(doc.file_name, DEFAULT_FILE_NAME);
    }

    #[test]
    fn section_that_does_not_fit_moves_to_next_page() {
        // 25 rows: 10 + 200 + 15 = 225mm; two of them cannot share a page.
        let report = class_report(&[("5", 25), ("7", 25)]);
        let doc = layout_class_report(&report, &LayoutOptions::default());
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[1].sections[0].standard, "7");
        assert_eq!(doc.pages[1].sections[0].heading_y, 20.0);
        assert!(doc.pages.iter().flat_map(|p| &p.sections).all(|s| !s.continued));
    }

    #[test]
    fn long_table_continues_with_repeated_header() {
        let report = class_report(&[("5", 60)]);
        let doc = layout_class_report(&report, &LayoutOptions::default());
        assert!(doc.pages.len() >= 2);

        let sections: Vec<&ReportSection> = doc.pages.iter().flat_map(|p| &p.sections).collect();
        let total_rows: usize = sections.iter().map(|s| s.rows.len()).sum();
        assert_eq!(total_rows, 60);
        assert!(!sections[0].continued);
        assert!(sections[1..].iter().all(|s| s.continued));
        assert_eq!(sections[1].heading, "Class 5 (cont.)");

        let g = PageGeometry::default();
        for s in &sections {
            assert!(s.end_y <= g.page_height - g.bottom_margin + 1e-9);
        }
    }

    #[test]
    fn heading_font_is_registered_and_attached() {
        let report = class_report(&[("5", 1)]);
        let opts = LayoutOptions {
            heading_prefix: "इयत्ता".to_string(),
            heading_font: Some(FontRegistration {
                family: "NotoSansDevanagari".into(),
                source: "fonts/NotoSansDevanagari-Regular.ttf".into(),
                script: Some("Devanagari".into()),
            }),
            ..LayoutOptions::default()
        };
        let doc = layout_class_report(&report, &opts);
        assert_eq!(doc.fonts.len(), 1);
        let s = &doc.pages[0].sections[0];
        assert_eq!(s.heading, "इयत्ता 5");
        assert_eq!(s.heading_font.as_deref(), Some("NotoSansDevanagari"));
    }

    #[test]
    fn empty_report_is_one_blank_page() {
        let doc = layout_class_report(&ClassWiseReport::new(), &LayoutOptions::default());
        assert_eq!(doc.pages.len(), 1);
        assert_eq!(doc.section_count(), 0);
    }
}
