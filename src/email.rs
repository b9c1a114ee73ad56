//! HTML bodies for results notices and evaluator invitations.

use std::fmt::Write;

use chrono::{Datelike, Utc};

use crate::models::Semester;

pub const SUBJECT: &str = "Dormitory Evaluation System";

/// One row of the per-criterion breakdown in a results notice.
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionLine {
    pub name: String,
    pub description: String,
    pub weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct ResultsLetter<'a> {
    pub dormer_name: &'a str,
    pub criteria: &'a [CriterionLine],
    pub total_score: f64,
    pub rank: usize,
    pub school_year: &'a str,
    pub semester: Semester,
}

struct Theme {
    header_gradient: &'static str,
    header_subtitle: &'static str,
    heading_icon: &'static str,
    card_background: &'static str,
    card_border: &'static str,
    card_label: &'static str,
    card_value: &'static str,
    accent: &'static str,
}

const STANDARD: Theme = Theme {
    header_gradient: "linear-gradient(135deg, #10b981 0%, #059669 100%)",
    header_subtitle: "#ecfdf5",
    heading_icon: "&#128202;",
    card_background: "#f0fdf4",
    card_border: "#bbf7d0",
    card_label: "#166534",
    card_value: "#15803d",
    accent: "#10b981",
};

const EVICTION: Theme = Theme {
    header_gradient: "linear-gradient(135deg, #ef4444 0%, #b91c1c 100%)",
    header_subtitle: "#fecaca",
    heading_icon: "&#128221;",
    card_background: "#fef2f2",
    card_border: "#fecaca",
    card_label: "#991b1b",
    card_value: "#dc2626",
    accent: "#ef4444",
};

const EVICTION_PARAGRAPHS: [&str; 5] = [
    "I am writing this email with a heavy heart, as this is one of the most difficult messages I have had to craft.",
    "After the evaluation process and long deliberation with SAs and adviser, we have finalized the rank of the dormers from the past semester. It was a difficult process, and it pains me to inform you that you are among the residents who will not be retained for the next semester.",
    "Please know that this decision was not made lightly and not an easy one. While your time in the dormitory may have been short, I genuinely hope it was meaningful. Setbacks are often setups for a comeback, and this transition does not define your worth or your potential as an individual.",
    "I personally care for you and value the time you spent with us. I hope you take this not as a closed door, but as an opportunity to start fresh. I am rooting for your success in your next chapter.",
    "See you on campus!",
];

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Weight as a plain percentage number: `20`, `12.5`.
pub fn format_weight(weight: f64) -> String {
    if weight.fract() == 0.0 {
        format!("{weight:.0}")
    } else {
        let text = format!("{weight:.2}");
        text.trim_end_matches('0').to_string()
    }
}

fn open_document(out: &mut String, title: &str) {
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html lang=\"en\">");
    let _ = writeln!(
        out,
        "<head><meta charset=\"UTF-8\"><meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\"><title>{title}</title></head>"
    );
    let _ = writeln!(
        out,
        "<body style=\"margin: 0; padding: 0; font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; background-color: #f5f5f5;\">"
    );
    let _ = writeln!(
        out,
        "<table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" style=\"background-color: #f5f5f5; padding: 40px 20px;\"><tr><td align=\"center\">"
    );
    let _ = writeln!(
        out,
        "<table width=\"600\" cellpadding=\"0\" cellspacing=\"0\" style=\"background-color: #ffffff; border-radius: 12px; overflow: hidden;\">"
    );
}

fn close_document(out: &mut String, footer_line: &str) {
    let year = Utc::now().year();
    let _ = writeln!(
        out,
        "<tr><td style=\"background-color: #f9fafb; padding: 30px; text-align: center; border-top: 1px solid #e5e7eb;\">"
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 0 0 10px 0; color: #6b7280; font-size: 14px;\">{footer_line}</p>"
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 0; color: #9ca3af; font-size: 12px;\">&copy; {year} Dormitory Evaluation System. All rights reserved.</p>"
    );
    let _ = writeln!(out, "</td></tr>");
    let _ = writeln!(out, "</table></td></tr></table>");
    let _ = writeln!(out, "</body>");
    let _ = write!(out, "</html>");
}

fn score_card(out: &mut String, theme: &Theme, label: &str, value: &str) {
    let _ = writeln!(
        out,
        "<div style=\"flex: 1; background-color: {}; border: 1px solid {}; padding: 20px; border-radius: 8px; text-align: center;\">",
        theme.card_background, theme.card_border
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 0; color: {}; font-size: 14px; text-transform: uppercase; font-weight: 600;\">{label}</p>",
        theme.card_label
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 10px 0 0 0; color: {}; font-size: 36px; font-weight: 800;\">{value}</p>",
        theme.card_value
    );
    let _ = writeln!(out, "</div>");
}

fn criteria_rows(out: &mut String, criteria: &[CriterionLine]) {
    for line in criteria {
        let _ = writeln!(out, "<tr style=\"border-bottom: 1px solid #e5e7eb;\">");
        let _ = writeln!(
            out,
            "<td style=\"padding: 12px 0;\"><p style=\"margin: 0; color: #1f2937; font-weight: 600;\">{}</p><p style=\"margin: 4px 0 0 0; color: #6b7280; font-size: 12px;\">{}</p></td>",
            escape_html(&line.name),
            escape_html(&line.description)
        );
        let _ = writeln!(
            out,
            "<td style=\"padding: 12px 0; text-align: center; color: #4b5563;\"><span style=\"background-color: #e5e7eb; padding: 2px 8px; border-radius: 12px; font-size: 12px;\">{}%</span></td>",
            format_weight(line.weight)
        );
        let _ = writeln!(
            out,
            "<td style=\"padding: 12px 0; text-align: right; font-weight: 600; color: #1f2937;\">{:.2}</td>",
            line.score
        );
        let _ = writeln!(out, "</tr>");
    }
}

fn render_results(letter: &ResultsLetter<'_>, theme: &Theme, greeting: &str, body: &[&str]) -> String {
    let mut out = String::new();
    open_document(&mut out, "Evaluation Results");

    let _ = writeln!(
        out,
        "<tr><td style=\"background: {}; padding: 40px 30px; text-align: center;\">",
        theme.header_gradient
    );
    let _ = writeln!(
        out,
        "<h1 style=\"margin: 0; color: #ffffff; font-size: 28px; font-weight: 700;\">{} Evaluation Results</h1>",
        theme.heading_icon
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 10px 0 0 0; color: {}; font-size: 16px;\">S.Y. {} {} Semester</p>",
        theme.header_subtitle,
        escape_html(letter.school_year),
        letter.semester.ordinal()
    );
    let _ = writeln!(out, "</td></tr>");

    let _ = writeln!(out, "<tr><td style=\"padding: 40px 30px;\">");
    let _ = writeln!(
        out,
        "<h2 style=\"margin: 0 0 10px 0; color: #1f2937; font-size: 24px; font-weight: 600;\">{greeting}</h2>"
    );
    let _ = writeln!(
        out,
        "<div style=\"color: #4b5563; font-size: 16px; line-height: 1.6; margin-bottom: 30px;\">"
    );
    for paragraph in body {
        let _ = writeln!(out, "<p style=\"margin-bottom: 16px;\">{paragraph}</p>");
    }
    let _ = writeln!(out, "</div>");

    let _ = writeln!(out, "<div style=\"display: flex; gap: 20px; margin-bottom: 30px;\">");
    score_card(&mut out, theme, "Final Score", &format!("{:.2}", letter.total_score));
    score_card(&mut out, theme, "Rank", &format!("#{}", letter.rank));
    let _ = writeln!(out, "</div>");

    let _ = writeln!(
        out,
        "<h3 style=\"margin: 0 0 15px 0; color: #374151; font-size: 18px; font-weight: 600; border-left: 4px solid {}; padding-left: 10px;\">Detailed Breakdown</h3>",
        theme.accent
    );
    let _ = writeln!(
        out,
        "<table width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" style=\"margin-bottom: 20px;\">"
    );
    let _ = writeln!(
        out,
        "<thead><tr><th style=\"text-align: left;\">Criteria</th><th style=\"text-align: center;\">Weight</th><th style=\"text-align: right;\">Points</th></tr></thead>"
    );
    let _ = writeln!(out, "<tbody>");
    criteria_rows(&mut out, letter.criteria);
    let _ = writeln!(out, "</tbody></table>");

    let _ = writeln!(
        out,
        "<div style=\"background-color: #f9fafb; padding: 20px; border-radius: 8px; margin-top: 30px; font-size: 14px; color: #6b7280; line-height: 1.6;\"><p style=\"margin: 0;\"><strong>Note:</strong> These results are aggregated from objective metrics and peer evaluations. If you have any questions regarding your score, please contact the administration.</p></div>"
    );
    let _ = writeln!(out, "</td></tr>");

    close_document(&mut out, "Dormitory Evaluation System");
    out
}

pub fn results_email(letter: &ResultsLetter<'_>) -> String {
    let greeting = format!("Hello, {}", escape_html(letter.dormer_name));
    render_results(
        letter,
        &STANDARD,
        &greeting,
        &["Your evaluation results have been finalized. Here is a breakdown of your performance based on the specific criteria."],
    )
}

/// Results notice for dormers below the retention threshold.
pub fn evicted_results_email(letter: &ResultsLetter<'_>) -> String {
    let greeting = format!("Dear {},", escape_html(letter.dormer_name));
    render_results(letter, &EVICTION, &greeting, &EVICTION_PARAGRAPHS)
}

pub fn evaluator_invitation_email(evaluator_link: &str) -> String {
    let link = escape_html(evaluator_link);
    let mut out = String::new();
    open_document(&mut out, "Evaluator Invitation");

    let _ = writeln!(
        out,
        "<tr><td style=\"background: {}; padding: 40px 30px; text-align: center;\">",
        STANDARD.header_gradient
    );
    let _ = writeln!(
        out,
        "<h1 style=\"margin: 0; color: #ffffff; font-size: 28px; font-weight: 700;\">&#127942; Dormitory Evaluation System</h1>"
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 10px 0 0 0; color: #ecfdf5; font-size: 14px;\">Evaluator Invitation</p>"
    );
    let _ = writeln!(out, "</td></tr>");

    let _ = writeln!(out, "<tr><td style=\"padding: 40px 30px;\">");
    let _ = writeln!(
        out,
        "<h2 style=\"margin: 0 0 20px 0; color: #1f2937; font-size: 24px; font-weight: 600;\">You've Been Selected as an Evaluator!</h2>"
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 0 0 20px 0; color: #4b5563; font-size: 16px; line-height: 1.6;\">Congratulations! You have been selected to participate as an evaluator in the dormitory evaluation process. Your input is valuable in helping us maintain and improve our dormitory standards.</p>"
    );
    let _ = writeln!(
        out,
        "<div style=\"background-color: #f0fdf4; border-left: 4px solid #10b981; padding: 20px; margin: 20px 0; border-radius: 4px;\"><p style=\"margin: 0; color: #374151; font-size: 14px; line-height: 1.6;\"><strong>What's Next?</strong><br>Click the button below to access your evaluator dashboard and begin the evaluation process. You'll be able to review and rate your fellow dormers based on established criteria.</p></div>"
    );
    let _ = writeln!(
        out,
        "<p style=\"text-align: center; margin: 30px 0;\"><a href=\"{link}\" style=\"display: inline-block; background: {}; color: #ffffff; text-decoration: none; padding: 16px 40px; border-radius: 8px; font-size: 16px; font-weight: 600;\">Access Evaluator Dashboard &rarr;</a></p>",
        STANDARD.header_gradient
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 20px 0 0 0; color: #6b7280; font-size: 14px; line-height: 1.6;\">If the button doesn't work, copy and paste this link into your browser:</p>"
    );
    let _ = writeln!(
        out,
        "<p style=\"margin: 10px 0 0 0;\"><a href=\"{link}\" style=\"color: #10b981; text-decoration: none; word-break: break-all; font-size: 14px;\">{link}</a></p>"
    );
    let _ = writeln!(out, "</td></tr>");

    close_document(&mut out, "Thank you for your participation!");
    out
}

/// Link an evaluator follows to reach their scoring page.
pub fn evaluator_link(base_url: &str, evaluator_id: uuid::Uuid) -> String {
    format!("{}/evaluator/{}", base_url.trim_end_matches('/'), evaluator_id)
}

/// Plain-text fallback derived from an HTML body. Tags are dropped and entities
/// decoded; an unknown entity is kept as written.
pub fn strip_tags(html: &str) -> String {
    let mut stripped = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => stripped.push(ch),
            _ => {}
        }
    }
    decode_entities(&stripped)
}

fn decode_entities(input: &str) -> String {
    let mut text = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('&') {
        text.push_str(&rest[..start]);
        rest = &rest[start..];
        let decoded = rest
            .find(';')
            .filter(|&end| end <= 10)
            .and_then(|end| entity(&rest[1..end]).map(|ch| (ch, end)));
        match decoded {
            Some((ch, end)) => {
                text.push(ch);
                rest = &rest[end + 1..];
            }
            None => {
                text.push('&');
                rest = &rest[1..];
            }
        }
    }
    text.push_str(rest);
    text
}

fn entity(name: &str) -> Option<char> {
    let code = match name {
        "amp" => return Some('&'),
        "lt" => return Some('<'),
        "gt" => return Some('>'),
        "quot" => return Some('"'),
        "apos" => return Some('\''),
        "nbsp" => return Some('\u{a0}'),
        "copy" => return Some('\u{a9}'),
        _ => match name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => name.strip_prefix('#')?.parse().ok()?,
        },
    };
    char::from_u32(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines() -> Vec<CriterionLine> {
        vec![
            CriterionLine {
                name: "Cleanliness".to_string(),
                description: "Room & hallway upkeep".to_string(),
                weight: 60.0,
                score: 54.0,
            },
            CriterionLine {
                name: "Conduct".to_string(),
                description: "Peer rating".to_string(),
                weight: 12.5,
                score: 10.416666,
            },
        ]
    }

    #[test]
    fn results_email_shows_totals_and_breakdown() {
        let criteria = lines();
        let letter = ResultsLetter {
            dormer_name: "Avery Lee",
            criteria: &criteria,
            total_score: 64.416666,
            rank: 3,
            school_year: "2025-2026",
            semester: Semester::First,
        };

        let html = results_email(&letter);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Hello, Avery Lee"));
        assert!(html.contains("64.42"));
        assert!(html.contains(">#3</p>"));
        assert!(html.contains("S.Y. 2025-2026 1st Semester"));
        assert!(html.contains("Room &amp; hallway upkeep"));
        assert!(html.contains("12.5%"));
        assert!(html.contains("60%"));
        assert!(html.contains("10.42"));
        assert!(!html.contains("not be retained"));
    }

    #[test]
    fn eviction_email_uses_eviction_copy() {
        let criteria = lines();
        let letter = ResultsLetter {
            dormer_name: "Jules <Moreno>",
            criteria: &criteria,
            total_score: 12.0,
            rank: 40,
            school_year: "2025-2026",
            semester: Semester::Second,
        };

        let html = evicted_results_email(&letter);

        assert!(html.contains("Dear Jules &lt;Moreno&gt;,"));
        assert!(html.contains("not be retained"));
        assert!(html.contains("2nd Semester"));
        assert!(html.contains("#ef4444"));
    }

    #[test]
    fn invitation_links_to_evaluator_page() {
        let id = uuid::Uuid::nil();
        let link = evaluator_link("https://eval.example.edu/", id);
        assert_eq!(
            link,
            "https://eval.example.edu/evaluator/00000000-0000-0000-0000-000000000000"
        );
        let html = evaluator_invitation_email(&link);
        assert_eq!(html.matches(&link).count(), 3);
    }

    #[test]
    fn weight_formatting_drops_trailing_zeros() {
        assert_eq!(format_weight(20.0), "20");
        assert_eq!(format_weight(12.5), "12.5");
        assert_eq!(format_weight(33.33), "33.33");
    }

    #[test]
    fn strip_tags_keeps_text() {
        assert_eq!(strip_tags("<p>Hello <b>there</b></p>"), "Hello there");
    }

    #[test]
    fn strip_tags_decodes_entities() {
        let html = format!(
            "<h1>&#128202; Results</h1><p>{} &copy; 2026 &#x1F3C6;</p>",
            escape_html("Tom & \"Jo\" <3 it's")
        );
        assert_eq!(
            strip_tags(&html),
            "\u{1F4CA} ResultsTom & \"Jo\" <3 it's \u{a9} 2026 \u{1F3C6}"
        );
        assert_eq!(strip_tags("AT&T &bogus; &#xZZ; &"), "AT&T &bogus; &#xZZ; &");
    }
}
