use anyhow::{anyhow, Context};
use async_trait::async_trait;
use bytes::Bytes;
use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};

use super::Decoder;

/// DOCX body text via `docx-rs`: one line per paragraph, table cells tab-separated
/// row by row.
///
/// Like `PdfDecoder`, the parse is not stopped by the extraction timeout.
pub struct DocxDecoder;

#[async_trait]
impl Decoder for DocxDecoder {
    async fn decode(&self, content: Bytes) -> anyhow::Result<String> {
        tokio::task::spawn_blocking(move || read_docx_text(&content))
            .await
            .context("DOCX parser aborted")?
    }
}

fn read_docx_text(content: &[u8]) -> anyhow::Result<String> {
    let doc = docx_rs::read_docx(content).map_err(|e| anyhow!("malformed DOCX: {e}"))?;

    let mut lines = Vec::new();
    for child in &doc.document.children {
        match child {
            DocumentChild::Paragraph(p) => lines.push(paragraph_text(p)),
            DocumentChild::Table(t) => lines.extend(table_lines(t)),
            _ => {}
        }
    }
    Ok(lines.join("\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    for child in &paragraph.children {
        if let ParagraphChild::Run(run) = child {
            for run_child in &run.children {
                match run_child {
                    RunChild::Text(t) => text.push_str(&t.text),
                    RunChild::Tab(_) => text.push('\t'),
                    _ => {}
                }
            }
        }
    }
    text
}

fn table_lines(table: &Table) -> Vec<String> {
    let mut lines = Vec::new();
    for row in &table.rows {
        let TableChild::TableRow(row) = row;
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| {
                let TableRowChild::TableCell(cell) = cell;
                cell.children
                    .iter()
                    .filter_map(|c| match c {
                        TableCellContent::Paragraph(p) => Some(paragraph_text(p)),
                        _ => None,
                    })
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        lines.push(cells.join("\t"));
    }
    lines
}
