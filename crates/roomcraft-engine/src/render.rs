use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

/// Render model markdown into display-ready HTML.
///
/// Raw HTML in the source is escaped rather than passed through, so provider
/// text can be injected into a page as-is. Empty input yields empty output.
pub fn render_markdown(markdown: &str) -> String {
    if markdown.trim().is_empty() {
        return String::new();
    }

    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
        Event::Start(Tag::Link {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Link {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        Event::Start(Tag::Image {
            link_type,
            dest_url,
            title,
            id,
        }) => Event::Start(Tag::Image {
            link_type,
            dest_url: safe_url(dest_url),
            title,
            id,
        }),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Plain text as a single escaped paragraph; no markdown interpretation.
pub fn render_plain(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    let events = [
        Event::Start(Tag::Paragraph),
        Event::Text(CowStr::Borrowed(trimmed)),
        Event::End(TagEnd::Paragraph),
    ];
    let mut out = String::with_capacity(trimmed.len() + 8);
    html::push_html(&mut out, events.into_iter());
    out
}

fn safe_url(url: CowStr<'_>) -> CowStr<'_> {
    let lowered = url.trim().to_ascii_lowercase();
    if ["javascript:", "vbscript:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return CowStr::Borrowed("#");
    }
    url
}

#[cfg(test)]
mod tests {
    use super::{render_markdown, render_plain};

    #[test]
    fn empty_input_renders_empty() {
        assert_eq!(render_markdown(""), "");
        assert_eq!(render_markdown("  \n"), "");
    }

    #[test]
    fn bold_becomes_strong() {
        let html = render_markdown("**bold**");
        assert!(html.contains("<strong>bold</strong>"), "{html}");
    }

    #[test]
    fn numbered_suggestions_become_a_list() {
        let html = render_markdown("1. Warm whites\n2. Oak furniture\n");
        assert!(html.contains("<ol>"));
        assert!(html.contains("<li>Warm whites</li>"));
    }

    #[test]
    fn raw_html_is_escaped() {
        let html = render_markdown("Nice room <script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }

    #[test]
    fn script_links_are_neutralized() {
        let html = render_markdown("[click](javascript:alert(1))");
        assert!(!html.contains("javascript:"));
        assert!(html.contains("href=\"#\""));
    }

    #[test]
    fn plain_sentence_is_preserved() {
        let html = render_markdown("Use warm neutral tones.");
        assert_eq!(html, "<p>Use warm neutral tones.</p>\n");
    }

    #[test]
    fn plain_text_is_escaped_not_parsed() {
        assert_eq!(
            render_plain("**quota** <exceeded>"),
            "<p>**quota** &lt;exceeded&gt;</p>\n"
        );
        assert_eq!(render_plain(""), "");
        assert_eq!(
            render_plain("  failed reading a & b\n[link](x)  "),
            "<p>failed reading a &amp; b\n[link](x)</p>\n"
        );
    }
}
