use std::borrow::Cow;

use super::{DEV_NULL, Diff, DiffError, FileDiff, Hunk, Line, LineKind};

/// Drop markdown code fences (and any prose outside them) when the patch text
/// arrived wrapped in a ```` ```diff ```` block. Text without fences is returned as-is.
pub fn strip_markdown_fences(text: &str) -> Cow<'_, str> {
    let is_fence = |line: &str| line.trim_start().starts_with("```");
    if !text.lines().any(is_fence) {
        return Cow::Borrowed(text);
    }

    let mut inside = false;
    let mut fenced = String::new();
    let mut unfenced = String::new();
    for line in text.split_inclusive('\n') {
        if is_fence(line) {
            inside = !inside;
            continue;
        }
        if inside {
            fenced.push_str(line);
        } else {
            unfenced.push_str(line);
        }
    }

    let looks_like_diff =
        |body: &str| body.lines().any(|l| l.starts_with("--- ") || l.starts_with("diff --git "));
    if looks_like_diff(fenced.as_str()) {
        Cow::Owned(fenced)
    } else {
        Cow::Owned(unfenced)
    }
}

/// Parse unified diff text into a [`Diff`].
///
/// Parsing is lenient about hunk bodies: a body line without a `+`, `-`, ` `
/// or `\` marker is read as a context line whose leading space went missing.
/// Hunk header counts are recorded as declared, not validated; the repairer
/// reconciles them with the body.
pub fn parse_diff(text: &str) -> Result<Diff, DiffError> {
    let text = strip_markdown_fences(text);
    let lines: Vec<&str> = text
        .split_inclusive('\n')
        .map(|line| line.strip_suffix('\n').unwrap_or(line))
        .collect();

    let mut files = Vec::new();
    let mut i = 0usize;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("diff --git ") || starts_file_header(&lines, i) {
            let (file, next) = parse_file(&lines, i)?;
            files.push(file);
            i = next;
        } else if line.starts_with("@@") {
            return Err(DiffError::OrphanHunk {
                header: trim_cr(line).to_string(),
            });
        } else {
            i += 1;
        }
    }

    if files.is_empty() {
        return Err(DiffError::Empty);
    }
    Ok(Diff::new(files))
}

fn trim_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}

fn starts_file_header(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("--- ") && lines.get(i + 1).is_some_and(|next| next.starts_with("+++ "))
}

fn starts_next_file(lines: &[&str], i: usize) -> bool {
    lines[i].starts_with("diff --git ") || starts_file_header(lines, i)
}

fn parse_file(lines: &[&str], start: usize) -> Result<(FileDiff, usize), DiffError> {
    let mut file = FileDiff::new(None, None, Vec::new());
    let mut i = start;

    if lines[i].starts_with("diff --git ") {
        let header = trim_cr(lines[i]);
        file.git_header = Some(lines[i].to_string());
        if let Some((old, new)) = paths_from_git_header(header) {
            file.old_path = Some(old);
            file.new_path = Some(new);
        }
        i += 1;
        while i < lines.len() && !lines[i].starts_with("--- ") && !starts_next_file(lines, i) {
            if lines[i].starts_with("@@") {
                break;
            }
            let ext = trim_cr(lines[i]);
            if ext.starts_with("new file mode") {
                file.old_path = None;
            } else if ext.starts_with("deleted file mode") {
                file.new_path = None;
            }
            file.extended_headers.push(lines[i].to_string());
            i += 1;
        }
    }

    if i < lines.len() && starts_file_header(lines, i) {
        file.old_path = parse_header_path(&lines[i]["--- ".len()..]);
        file.new_path = parse_header_path(&lines[i + 1]["+++ ".len()..]);
        file.old_header = Some(lines[i].to_string());
        file.new_header = Some(lines[i + 1].to_string());
        i += 2;
    }

    while i < lines.len() && lines[i].starts_with("@@") {
        let (hunk, next) = parse_hunk(lines, i, file.display_path())?;
        file.hunks.push(hunk);
        i = next;
    }

    Ok((file, i))
}

fn paths_from_git_header(header: &str) -> Option<(String, String)> {
    let rest = header.strip_prefix("diff --git ")?;
    let (old, new) = rest.split_once(" b/")?;
    let old = old.strip_prefix("a/").unwrap_or(old);
    Some((old.to_string(), new.to_string()))
}

fn parse_header_path(raw: &str) -> Option<String> {
    let raw = trim_cr(raw);
    let raw = raw.split('\t').next().unwrap_or(raw).trim();
    let raw = raw
        .strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(raw);
    if raw == DEV_NULL {
        return None;
    }
    let path = raw
        .strip_prefix("a/")
        .or_else(|| raw.strip_prefix("b/"))
        .unwrap_or(raw);
    Some(path.to_string())
}

fn parse_hunk(lines: &[&str], start: usize, path: &str) -> Result<(Hunk, usize), DiffError> {
    let header = trim_cr(lines[start]);
    let (old_start, old_count, new_start, new_count, section) = parse_hunk_header(header)
        .ok_or_else(|| DiffError::MalformedHunk {
            path: path.to_string(),
            header: header.to_string(),
        })?;

    let mut hunk = Hunk::new(old_start, old_count, new_start, new_count, Vec::new());
    hunk.section = section.to_string();
    hunk.raw_header = Some(lines[start].to_string());

    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        if line.starts_with("@@") || starts_next_file(lines, i) {
            break;
        }
        let parsed = match line.chars().next() {
            Some('+') => Line::new(LineKind::Added, &line[1..]),
            Some('-') => Line::new(LineKind::Removed, &line[1..]),
            Some(' ') => Line::new(LineKind::Context, &line[1..]),
            Some('\\') => Line::new(LineKind::NoNewlineMarker, &line[1..]),
            _ => {
                hunk.restored_prefixes += 1;
                Line::new(LineKind::Context, line)
            }
        };
        hunk.lines.push(parsed);
        i += 1;
    }

    drop_trailing_separators(&mut hunk);
    Ok((hunk, i))
}

/// Blank unmarked lines at the very end of a hunk are usually separators
/// between files rather than context. They are dropped only when the hunk's
/// declared counts already agree with the body without them.
fn drop_trailing_separators(hunk: &mut Hunk) {
    let trailing = hunk
        .lines
        .iter()
        .rev()
        .take_while(|line| line.kind == LineKind::Context && trim_cr(&line.text).is_empty())
        .count()
        .min(hunk.restored_prefixes);
    if trailing == 0 {
        return;
    }

    let keep = hunk.lines.len() - trailing;
    let candidate = Hunk::new(0, 0, 0, 0, hunk.lines[..keep].to_vec());
    let (old, new) = candidate.tally();
    if (old, new) == (hunk.old_count, hunk.new_count) {
        hunk.lines.truncate(keep);
        hunk.restored_prefixes -= trailing;
    }
}

fn parse_hunk_header(header: &str) -> Option<(usize, usize, usize, usize, &str)> {
    let rest = header.strip_prefix("@@ ")?;
    let (ranges, section) = rest.split_once(" @@")?;
    let mut parts = ranges.split_whitespace();
    let (old_start, old_count) = parse_range(parts.next()?.strip_prefix('-')?)?;
    let (new_start, new_count) = parse_range(parts.next()?.strip_prefix('+')?)?;
    if parts.next().is_some() {
        return None;
    }
    Some((old_start, old_count, new_start, new_count, section))
}

fn parse_range(raw: &str) -> Option<(usize, usize)> {
    match raw.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((raw.parse().ok()?, 1)),
    }
}
