use scraper::ElementRef;

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "blockquote", "dd", "div", "dl", "dt", "figcaption", "footer", "h1",
    "h2", "h3", "h4", "h5", "h6", "header", "li", "ol", "p", "pre", "section", "table", "tr",
    "ul",
];

/// Rendered-ish text of an element: block elements and `<br>` become line
/// breaks, whitespace inside a line collapses, blank lines are dropped.
pub fn inner_text(el: ElementRef) -> String {
    let mut raw = String::new();
    collect(el, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect(el: ElementRef, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            continue;
        }
        let Some(child_el) = ElementRef::wrap(child) else {
            continue;
        };
        match child_el.value().name() {
            "br" => out.push('\n'),
            "script" | "style" | "template" => {}
            name => {
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect(child_el, out);
                if block {
                    out.push('\n');
                }
            }
        }
    }
}

/// First non-empty line of an element's text.
pub fn first_line(el: ElementRef) -> String {
    inner_text(el).lines().next().unwrap_or_default().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn text_of(html: &str) -> String {
        let doc = Html::parse_fragment(html);
        let sel = Selector::parse("#root").unwrap();
        inner_text(doc.select(&sel).next().unwrap())
    }

    #[test]
    fn block_elements_break_lines() {
        let t = text_of("<div id='root'><p>First   line</p><p>Second\n   line</p></div>");
        assert_eq!(t, "First line\nSecond line");
    }

    #[test]
    fn br_and_inline() {
        let t = text_of("<div id='root'>One <b>bold</b> word<br>Two</div>");
        assert_eq!(t, "One bold word\nTwo");
    }

    #[test]
    fn skips_scripts() {
        let t = text_of("<div id='root'>Visible<script>var x = 1;</script></div>");
        assert_eq!(t, "Visible");
    }
}
