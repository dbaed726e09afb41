//! DOCX and PPTX text extraction.
//!
//! Both formats are zip containers of XML parts. Text lives in run elements
//! (`<w:t>` for Word, `<a:t>` for DrawingML) and every paragraph end becomes
//! a line break.

use std::io::{Cursor, Read};
use std::sync::OnceLock;

use regex::Regex;
use zip::ZipArchive;

static WORD_RUN: OnceLock<Regex> = OnceLock::new();
static DRAWING_RUN: OnceLock<Regex> = OnceLock::new();
static SLIDE_NAME: OnceLock<Regex> = OnceLock::new();
static CHAR_REF: OnceLock<Regex> = OnceLock::new();

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> Result<&'static Regex, String> {
    if let Some(re) = cell.get() {
        return Ok(re);
    }
    let re = Regex::new(pattern).map_err(|e| e.to_string())?;
    Ok(cell.get_or_init(|| re))
}

pub(super) fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let xml = read_member(&mut archive, "word/document.xml")?;
    let run = cached(&WORD_RUN, r"<w:t(?:\s[^>]*)?>([^<]*)</w:t>")?;
    paragraphs_text(&xml, "</w:p>", run)
}

pub(super) fn pptx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let slide_name = cached(&SLIDE_NAME, r"^ppt/slides/slide(\d+)\.xml$")?;

    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = slide_name.captures(name)?.get(1)?.as_str().parse().ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort_by_key(|(number, _)| *number);

    let run = cached(&DRAWING_RUN, r"<a:t(?:\s[^>]*)?>([^<]*)</a:t>")?;
    let mut texts = Vec::with_capacity(slides.len());
    for (_, name) in slides {
        let xml = read_member(&mut archive, &name)?;
        let text = paragraphs_text(&xml, "</a:p>", run)?;
        if !text.is_empty() {
            texts.push(text);
        }
    }
    Ok(texts.join("\n\n"))
}

fn read_member(archive: &mut ZipArchive<Cursor<&[u8]>>, name: &str) -> Result<String, String> {
    let mut member = archive
        .by_name(name)
        .map_err(|e| format!("{}: {}", name, e))?;
    let mut xml = String::new();
    member
        .read_to_string(&mut xml)
        .map_err(|e| format!("{}: {}", name, e))?;
    Ok(xml)
}

fn paragraphs_text(xml: &str, paragraph_end: &str, run: &Regex) -> Result<String, String> {
    let mut lines = Vec::new();
    for paragraph in xml.split(paragraph_end) {
        let mut line = String::new();
        for caps in run.captures_iter(paragraph) {
            if let Some(text) = caps.get(1) {
                line.push_str(&unescape_xml(text.as_str())?);
            }
        }
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines.join("\n"))
}

fn unescape_xml(text: &str) -> Result<String, String> {
    if !text.contains('&') {
        return Ok(text.to_string());
    }

    let char_ref = cached(&CHAR_REF, r"&#(x[0-9A-Fa-f]+|[0-9]+);")?;
    let numeric = char_ref.replace_all(text, |caps: &regex::Captures| {
        let raw = &caps[1];
        let code = match raw.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => raw.parse().ok(),
        };
        code.and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_default()
    });

    Ok(numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&"))
}
