use pulldown_cmark::{html, Options, Parser};

fn render_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_FOOTNOTES
}

/// Render markdown to an HTML fragment.
///
/// Pure and deterministic: the same input always yields the same markup, so
/// callers can re-render an entire accumulated reply on every increment.
pub fn render(markdown: &str) -> String {
    let parser = Parser::new_ext(markdown, render_options());
    let mut markup = String::with_capacity(markdown.len() + markdown.len() / 2);
    html::push_html(&mut markup, parser);
    markup
}
