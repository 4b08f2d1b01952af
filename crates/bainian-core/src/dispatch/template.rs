//! Greeting templates: two named placeholders, plain substitution.

/// Replaced with the recipient's title (称谓).
pub const TITLE_PLACEHOLDER: &str = "{称谓}";
/// Replaced with the recipient's honorific (敬语).
pub const HONORIFIC_PLACEHOLDER: &str = "{敬语}";

/// Substitute every occurrence of both placeholders. No escaping.
pub fn render(template: &str, title: &str, honorific: &str) -> String {
    template
        .replace(TITLE_PLACEHOLDER, title)
        .replace(HONORIFIC_PLACEHOLDER, honorific)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_example() {
        assert_eq!(
            render("Happy New Year {称谓}! {敬语} best wishes.", "Boss", "Sir"),
            "Happy New Year Boss! Sir best wishes."
        );
    }

    #[test]
    fn test_every_occurrence_replaced() {
        assert_eq!(render("{称谓}{称谓}-{敬语}", "A", "B"), "AA-B");
    }

    #[test]
    fn test_render_is_idempotent() {
        let template = "给{称谓}拜年！祝{敬语}新年快乐";
        assert_eq!(render(template, "王总", "您"), render(template, "王总", "您"));
    }

    #[test]
    fn test_unknown_braces_untouched() {
        assert_eq!(render("{name} {称谓}", "X", "Y"), "{name} X");
    }
}
