//! Resume Parser — deterministic text-to-structure extraction.
//!
//! Scans plain resume text (the extraction backend already stripped source
//! formats) section by section. Partial extraction is success: a section the
//! text never declares stays `None`/empty and downstream scoring treats it as
//! unknown, never as a zero signal. `ParseError` is reserved for structurally
//! unusable input.

use std::collections::BTreeSet;

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ParseError;

/// Structured extraction of one resume. Fields the source text did not
/// declare are explicitly absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedResume {
    /// Lowercased skill tags. `None` means no skills section was recognized —
    /// unknown, which is different from an empty skill list.
    pub skills: Option<BTreeSet<String>>,
    /// Overall years of experience summed from parseable employment periods,
    /// or an explicit "N years" statement, whichever is larger.
    pub years_experience: Option<f32>,
    pub employment: Vec<EmploymentEntry>,
    pub education: Vec<EducationEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmploymentEntry {
    pub title: String,
    pub organization: Option<String>,
    /// Raw period text as it appeared, e.g. "2019 - 2023".
    pub period: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EducationEntry {
    pub institution: String,
    pub year: Option<u16>,
    pub field: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Skills,
    Experience,
    Education,
}

/// Parses raw resume text into a [`ParsedResume`].
pub fn parse(raw_text: &str) -> Result<ParsedResume, ParseError> {
    let text = raw_text.trim();
    if text.is_empty() {
        return Err(ParseError::Empty);
    }
    reject_non_text(text)?;

    let mut skills: Option<BTreeSet<String>> = None;
    let mut employment = Vec::new();
    let mut education = Vec::new();
    let mut span_years = 0.0f32;
    let mut stated_years: Option<f32> = None;

    let mut section = Section::Preamble;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(next) = classify_header(line) {
            section = next;
            continue;
        }

        match section {
            Section::Preamble => {
                // The preamble (titles, contact lines) is intentionally not
                // extracted; it is where PII lives.
                if let Some(years) = explicit_years(line) {
                    stated_years = Some(stated_years.unwrap_or(0.0).max(years));
                }
            }
            Section::Skills => {
                let set = skills.get_or_insert_with(BTreeSet::new);
                for skill in split_skill_line(line) {
                    set.insert(skill);
                }
            }
            Section::Experience => {
                if let Some(years) = explicit_years(line) {
                    stated_years = Some(stated_years.unwrap_or(0.0).max(years));
                }
                if let Some(entry) = parse_employment_line(line) {
                    if let Some(period) = &entry.period {
                        span_years += period_span_years(period);
                    }
                    employment.push(entry);
                }
            }
            Section::Education => {
                if let Some(entry) = parse_education_line(line) {
                    education.push(entry);
                }
            }
        }
    }

    // A skills header with nothing parseable under it is still unknown.
    if matches!(&skills, Some(set) if set.is_empty()) {
        skills = None;
    }

    let computed = if span_years > 0.0 { Some(span_years) } else { None };
    let years_experience = match (computed, stated_years) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    };

    Ok(ParsedResume {
        skills,
        years_experience,
        employment,
        education,
    })
}

/// Rejects input that is not readable text: mostly control bytes, or no
/// letters at all.
fn reject_non_text(text: &str) -> Result<(), ParseError> {
    let total = text.chars().count();
    let control = text
        .chars()
        .filter(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'))
        .count();
    if control * 10 > total {
        return Err(ParseError::NotText(format!(
            "{control} control characters in {total}"
        )));
    }
    if !text.chars().any(|c| c.is_alphabetic()) {
        return Err(ParseError::NotText("no letters found".to_string()));
    }
    Ok(())
}

/// Recognizes short standalone section headers such as "Skills:",
/// "Work Experience" or "EDUCATION".
fn classify_header(line: &str) -> Option<Section> {
    if line.len() > 40 {
        return None;
    }
    let lowered = line
        .trim_start_matches(['#', '*', '-', ' '])
        .trim_end_matches(':')
        .trim()
        .to_lowercase();
    if lowered.starts_with("skill") || lowered == "technologies" || lowered == "tech stack" {
        Some(Section::Skills)
    } else if lowered.contains("experience")
        || lowered.contains("employment")
        || lowered.contains("work history")
    {
        Some(Section::Experience)
    } else if lowered.starts_with("education") {
        Some(Section::Education)
    } else {
        None
    }
}

/// Splits a skills line on list separators and bullets.
fn split_skill_line(line: &str) -> Vec<String> {
    line.split([',', ';', '•', '·', '|'])
        .map(|s| s.trim().trim_start_matches(['-', '*', ' ']).trim())
        .filter(|s| !s.is_empty() && s.len() <= 40)
        .map(str::to_lowercase)
        .collect()
}

/// Parses one employment line, e.g.
/// "Backend Engineer at Acme GmbH, 2019 - 2023".
fn parse_employment_line(line: &str) -> Option<EmploymentEntry> {
    let line = line.trim_start_matches(['-', '*', '•', ' ']).trim();
    if line.is_empty() {
        return None;
    }

    let period = extract_period(line);
    let head = match &period {
        Some(p) => line.split(p.as_str()).next().unwrap_or(line),
        None => line,
    };
    let head = head.trim_end_matches([' ', ',', '-', '—', '(']).trim();
    if head.is_empty() {
        return None;
    }

    let (title, organization) = match head.split_once(" at ") {
        Some((t, org)) => (t.trim().to_string(), Some(org.trim().to_string())),
        None => (head.to_string(), None),
    };
    if title.is_empty() {
        return None;
    }

    Some(EmploymentEntry {
        title,
        organization: organization.filter(|o| !o.is_empty()),
        period,
    })
}

/// Parses one education line, e.g. "TU Berlin, Computer Science, 2018".
fn parse_education_line(line: &str) -> Option<EducationEntry> {
    let line = line.trim_start_matches(['-', '*', '•', ' ']).trim();
    if line.is_empty() {
        return None;
    }
    let year = line_years(line).first().map(|y| *y as u16);
    let mut parts = line.split(',').map(str::trim);
    let institution = parts.next()?.to_string();
    let field = parts
        .find(|p| !p.is_empty() && line_years(p).is_empty())
        .map(str::to_string);
    Some(EducationEntry {
        institution,
        year,
        field,
    })
}

/// Extracts the period substring from a line: the span from the first year
/// to the last year or "present"-style token.
fn extract_period(line: &str) -> Option<String> {
    let positions = year_positions(line);
    let (start, _) = *positions.first()?;

    let lowered = line.to_lowercase();
    let end_token = ["present", "current", "now", "today"]
        .iter()
        .filter_map(|t| lowered.rfind(t).map(|p| (p, t.len())))
        .max_by_key(|(p, _)| *p);
    let last_year = positions.last().copied();

    let (end_pos, end_len) = match (end_token, last_year) {
        (Some(a), Some(b)) => {
            if a.0 > b.0 {
                a
            } else {
                b
            }
        }
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => return None,
    };
    if end_pos + end_len <= start {
        return None;
    }
    Some(line[start..end_pos + end_len].to_string())
}

/// Byte positions of every plausible 4-digit year on the line.
fn year_positions(line: &str) -> Vec<(usize, usize)> {
    let bytes = line.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let run = &line[start..i];
            if run.len() == 4 && parse_year(run).is_some() {
                out.push((start, 4));
            }
        } else {
            i += 1;
        }
    }
    out
}

/// Years a period text spans; open-ended periods run to the current year.
fn period_span_years(period: &str) -> f32 {
    let years = line_years(period);
    let lowered = period.to_lowercase();
    let open_ended = ["present", "current", "now", "today"]
        .iter()
        .any(|t| lowered.contains(t));

    let first = match years.first() {
        Some(y) => *y,
        None => return 0.0,
    };
    let last = if open_ended {
        Utc::now().year()
    } else {
        *years.last().unwrap_or(&first)
    };
    (last - first).max(0) as f32
}

/// All plausible 4-digit years on a line, in order.
fn line_years(line: &str) -> Vec<i32> {
    line.split(|c: char| !c.is_ascii_digit())
        .filter_map(|t| parse_year(t))
        .collect()
}

fn parse_year(token: &str) -> Option<i32> {
    let digits: String = token
        .trim_matches(|c: char| !c.is_ascii_digit())
        .to_string();
    if digits.len() != 4 {
        return None;
    }
    let year: i32 = digits.parse().ok()?;
    (1950..=2035).contains(&year).then_some(year)
}

/// Matches "7 years", "7+ years of experience", "3 yrs".
fn explicit_years(line: &str) -> Option<f32> {
    let lowered = line.to_lowercase();
    let tokens: Vec<&str> = lowered.split_whitespace().collect();
    for (i, token) in tokens.iter().enumerate() {
        if !token.starts_with("year") && !token.starts_with("yr") {
            continue;
        }
        let prev = match i.checked_sub(1).and_then(|p| tokens.get(p)) {
            Some(prev) => prev,
            None => continue,
        };
        let number: String = prev
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        if let Ok(value) = number.parse::<f32>() {
            // Year tokens inside a date range are not an experience claim.
            if parse_year(prev).is_none() {
                return Some(value);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESUME: &str = "\
Jane Doe
jane.doe@example.com | +49 151 000000

Skills
Go, Kubernetes, Docker; PostgreSQL

Experience
Backend Engineer at Acme GmbH, 2019 - 2023
Site Reliability Engineer at Beispiel AG, 2016 - 2019

Education
TU Berlin, Computer Science, 2016
";

    #[test]
    fn test_full_resume_extraction() {
        let resume = parse(FULL_RESUME).unwrap();

        let skills = resume.skills.expect("skills section present");
        assert!(skills.contains("go"));
        assert!(skills.contains("kubernetes"));
        assert!(skills.contains("docker"));
        assert!(skills.contains("postgresql"));

        assert_eq!(resume.employment.len(), 2);
        assert_eq!(resume.employment[0].title, "Backend Engineer");
        assert_eq!(resume.employment[0].organization.as_deref(), Some("Acme GmbH"));
        assert_eq!(resume.employment[0].period.as_deref(), Some("2019 - 2023"));

        // 4 + 3 years from the two spans.
        assert_eq!(resume.years_experience, Some(7.0));

        assert_eq!(resume.education.len(), 1);
        assert_eq!(resume.education[0].institution, "TU Berlin");
        assert_eq!(resume.education[0].year, Some(2016));
        assert_eq!(resume.education[0].field.as_deref(), Some("Computer Science"));
    }

    #[test]
    fn test_empty_input_is_parse_error() {
        assert!(matches!(parse(""), Err(ParseError::Empty)));
        assert!(matches!(parse("   \n\t  "), Err(ParseError::Empty)));
    }

    #[test]
    fn test_binary_garbage_is_parse_error() {
        let garbage = "\u{0000}\u{0001}\u{0002}\u{0003}a\u{0004}\u{0005}";
        assert!(matches!(parse(garbage), Err(ParseError::NotText(_))));
    }

    #[test]
    fn test_digits_only_is_parse_error() {
        assert!(matches!(parse("12345 67890"), Err(ParseError::NotText(_))));
    }

    #[test]
    fn test_missing_skills_section_is_unknown_not_empty() {
        let resume = parse("Experience\nEngineer at Somewhere, 2020 - 2022").unwrap();
        assert_eq!(resume.skills, None);
        assert_eq!(resume.years_experience, Some(2.0));
    }

    #[test]
    fn test_partial_extraction_is_success() {
        let resume = parse("Skills:\nRust, Go").unwrap();
        let skills = resume.skills.unwrap();
        assert_eq!(skills.len(), 2);
        assert!(resume.employment.is_empty());
        assert!(resume.education.is_empty());
        assert_eq!(resume.years_experience, None);
    }

    #[test]
    fn test_stated_years_beat_smaller_span() {
        let resume = parse(
            "10+ years of backend development\n\nSkills\nGo\n\nExperience\nEngineer at X, 2020 - 2022",
        )
        .unwrap();
        assert_eq!(resume.years_experience, Some(10.0));
    }

    #[test]
    fn test_open_ended_period_reaches_current_year() {
        let start = Utc::now().year() - 3;
        let text = format!("Experience\nEngineer at X, {start} - present");
        let resume = parse(&text).unwrap();
        assert_eq!(resume.years_experience, Some(3.0));
    }

    #[test]
    fn test_skill_lines_split_on_separators_and_bullets() {
        let skills = split_skill_line("- Go; Kubernetes • Docker | Terraform");
        assert_eq!(skills, vec!["go", "kubernetes", "docker", "terraform"]);
    }

    #[test]
    fn test_period_span_years() {
        assert_eq!(period_span_years("2019 - 2023"), 4.0);
        assert_eq!(period_span_years("March 2019 — June 2020"), 1.0);
        assert_eq!(period_span_years("no dates here"), 0.0);
    }

    #[test]
    fn test_employment_line_without_dates_keeps_title() {
        let entry = parse_employment_line("Freelance Consultant at Self-employed").unwrap();
        assert_eq!(entry.title, "Freelance Consultant");
        assert_eq!(entry.organization.as_deref(), Some("Self-employed"));
        assert_eq!(entry.period, None);
    }
}
