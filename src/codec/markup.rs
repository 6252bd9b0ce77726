use super::{Codec, FileFormat, header_names, write_atomic};
use crate::extract::RawValue;
use crate::interchange::ExportOptions;
use anyhow::Result;
use std::fmt::Write as _;
use std::io::Write as _;
use std::path::Path;

/// Header cells and body rows for table-shaped markup.
fn table_parts(
    rows: &[Vec<RawValue>],
    include_headers: bool,
) -> (Option<Vec<String>>, Vec<Vec<String>>) {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    let render = |row: &Vec<RawValue>| -> Vec<String> {
        (0..width)
            .map(|idx| row.get(idx).map(ToString::to_string).unwrap_or_default())
            .collect()
    };
    match rows.split_first() {
        Some((first, rest)) if include_headers => {
            (Some(render(first)), rest.iter().map(render).collect())
        }
        _ => (None, rows.iter().map(render).collect()),
    }
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    write_atomic(path, |out| {
        out.write_all(text.as_bytes())?;
        Ok(())
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownCodec;

impl MarkdownCodec {
    pub fn render(rows: &[Vec<RawValue>], include_headers: bool) -> String {
        let (headers, body) = table_parts(rows, include_headers);
        let headers = headers.unwrap_or_else(|| header_names(rows, false));
        let line = |cells: &[String]| {
            let escaped: Vec<String> = cells.iter().map(|cell| escape_markdown(cell)).collect();
            format!("| {} |\n", escaped.join(" | "))
        };

        let mut out = line(&headers);
        out.push_str(&format!("|{}\n", " --- |".repeat(headers.len())));
        for row in &body {
            out.push_str(&line(row));
        }
        out
    }
}

impl Codec for MarkdownCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Markdown
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        write_text(path, &Self::render(rows, options.include_headers))
    }
}

fn escape_markdown(text: &str) -> String {
    text.replace('|', "\\|")
        .replace("\r\n", "<br>")
        .replace('\n', "<br>")
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCodec;

impl HtmlCodec {
    pub fn render(rows: &[Vec<RawValue>], options: &ExportOptions) -> String {
        let (headers, body) = table_parts(rows, options.include_headers);
        let title = options.title.as_deref().unwrap_or("Exported data");

        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        let _ = writeln!(out, "<title>{}</title>", escape_html(title));
        out.push_str("</head>\n<body>\n<table>\n");
        if let Some(headers) = headers {
            out.push_str("<thead>\n<tr>");
            for cell in &headers {
                let _ = write!(out, "<th>{}</th>", escape_html(cell));
            }
            out.push_str("</tr>\n</thead>\n");
        }
        out.push_str("<tbody>\n");
        for row in &body {
            out.push_str("<tr>");
            for cell in row {
                let _ = write!(out, "<td>{}</td>", escape_html(cell));
            }
            out.push_str("</tr>\n");
        }
        out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
        out
    }
}

impl Codec for HtmlCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Html
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        write_text(path, &Self::render(rows, options))
    }
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TexCodec;

impl TexCodec {
    pub fn render(rows: &[Vec<RawValue>], options: &ExportOptions) -> String {
        let (headers, body) = table_parts(rows, options.include_headers);
        let width = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);
        let line = |cells: &[String]| {
            let escaped: Vec<String> = cells.iter().map(|cell| escape_tex(cell)).collect();
            format!("{} \\\\\n", escaped.join(" & "))
        };

        let mut out = String::from("\\begin{table}[h]\n\\centering\n");
        let _ = writeln!(out, "\\begin{{tabular}}{{{}}}", "l".repeat(width));
        out.push_str("\\hline\n");
        if let Some(headers) = headers {
            out.push_str(&line(&headers));
            out.push_str("\\hline\n");
        }
        for row in &body {
            out.push_str(&line(row));
        }
        out.push_str("\\hline\n\\end{tabular}\n");
        if let Some(title) = options.title.as_deref() {
            let _ = writeln!(out, "\\caption{{{}}}", escape_tex(title));
        }
        out.push_str("\\end{table}\n");
        out
    }
}

impl Codec for TexCodec {
    fn format(&self) -> FileFormat {
        FileFormat::Tex
    }

    fn export_rows(
        &self,
        rows: &[Vec<RawValue>],
        path: &Path,
        options: &ExportOptions,
    ) -> Result<()> {
        write_text(path, &Self::render(rows, options))
    }
}

fn escape_tex(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<RawValue>> {
        vec![
            vec![RawValue::from("name"), RawValue::from("a|b")],
            vec![RawValue::from("x<y"), RawValue::Number(1.5)],
        ]
    }

    #[test]
    fn markdown_escapes_pipes() {
        let md = MarkdownCodec::render(&rows(), true);
        assert_eq!(md, "| name | a\\|b |\n| --- | --- |\n| x<y | 1.5 |\n");
        let generated = MarkdownCodec::render(&rows(), false);
        assert!(generated.starts_with("| Column1 | Column2 |\n"));
    }

    #[test]
    fn html_escapes_markup() {
        let html = HtmlCodec::render(&rows(), &ExportOptions::new(FileFormat::Html));
        assert!(html.contains("<th>name</th><th>a|b</th>"));
        assert!(html.contains("<td>x&lt;y</td><td>1.5</td>"));
    }

    #[test]
    fn tex_escapes_specials() {
        assert_eq!(escape_tex("50% & $5_a"), "50\\% \\& \\$5\\_a");
        let tex = TexCodec::render(&rows(), &ExportOptions::new(FileFormat::Tex));
        assert!(tex.contains("\\begin{tabular}{ll}"));
        assert!(tex.contains("x<y & 1.5 \\\\\n"));
    }
}
