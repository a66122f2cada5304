// Password Reset Email Template

use herald_core::port::PasswordResetVars;

const PASSWORD_RESET_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Forgot Your Password?</title>
  <style>
    body { font-family: Arial, sans-serif; background-color: #f4f4f4; margin: 0; padding: 20px; }
    .container { max-width: 600px; margin: auto; background-color: #ffffff; padding: 30px; border-radius: 8px; }
    .button { display: inline-block; margin-top: 20px; padding: 12px 24px; background-color: #1e88e5; color: #ffffff; text-decoration: none; border-radius: 5px; font-weight: bold; }
    .footer { color: #999; font-size: 12px; margin-top: 30px; }
  </style>
</head>
<body>
  <div class="container">
    <h2 style="color: #333;">Hi {{full_name}},</h2>
    <p style="color: #555;">We received a request to reset the password for your account.</p>
    <p style="color: #555;">Click the button below to choose a new password:</p>
    <a href="{{url}}" class="button">Reset Your Password</a>
    <p class="footer">If you didn't request this, you can ignore this email. Your password will remain unchanged.</p>
  </div>
</body>
</html>
"#;

/// Render the fixed reset template; substituted values are HTML-escaped
pub fn render_password_reset(vars: &PasswordResetVars) -> String {
    PASSWORD_RESET_TEMPLATE
        .replace("{{full_name}}", &escape_html(&vars.full_name))
        .replace("{{url}}", &escape_html(&vars.url))
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(full_name: &str, url: &str) -> PasswordResetVars {
        PasswordResetVars {
            full_name: full_name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn test_substitutes_exactly() {
        let html = render_password_reset(&vars("Ada Lovelace", "https://app.example.com/reset"));
        assert!(html.contains("<h2 style=\"color: #333;\">Hi Ada Lovelace,</h2>"));
        assert!(html.contains("<a href=\"https://app.example.com/reset\" class=\"button\">"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn test_escapes_markup() {
        let html = render_password_reset(&vars(
            "<script>alert('x')</script>",
            "https://x.test/?a=1&b=\"2\"",
        ));
        assert!(html.contains("Hi &lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;,"));
        assert!(html.contains("href=\"https://x.test/?a=1&amp;b=&quot;2&quot;\""));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_no_extra_markup_for_empty_values() {
        let empty = render_password_reset(&vars("", ""));
        let filled = render_password_reset(&vars("A", "B"));
        assert_eq!(filled.len(), empty.len() + 2);
    }
}
