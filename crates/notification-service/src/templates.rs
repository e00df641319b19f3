use crate::Alert;

pub struct EmailTemplate;

impl EmailTemplate {
    /// HTML rendering of an alert; each message line becomes a paragraph.
    pub fn render(alert: &Alert) -> String {
        let paragraphs: String = alert
            .message
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                format!(
                    r#"<p style="color:#334155;margin:0 0 8px;">{}</p>"#,
                    escape(line)
                )
            })
            .collect::<Vec<_>>()
            .join("\n  ");

        format!(
            r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><meta name="viewport" content="width=device-width,initial-scale=1"></head>
<body style="margin:0;padding:0;background:#f1f5f9;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;">
<table width="100%" cellpadding="0" cellspacing="0" style="background:#f1f5f9;padding:32px 0;">
  <tr><td align="center">
    <table width="600" cellpadding="0" cellspacing="0" style="background:#ffffff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);">
      <tr><td>
        <div style="background:#16a34a;color:#fff;padding:12px 20px;border-radius:8px 8px 0 0;font-size:18px;font-weight:700;">{title}</div>
        <div style="padding:16px 20px;">
  {paragraphs}
        </div>
      </td></tr>
      <tr><td style="padding:16px 20px;border-top:1px solid #e2e8f0;">
        <p style="margin:0;color:#94a3b8;font-size:12px;">Sent at {ts} UTC</p>
      </td></tr>
    </table>
    <p style="color:#94a3b8;font-size:11px;margin-top:16px;">Mortgage Rate Monitor</p>
  </td></tr>
</table>
</body>
</html>"#,
            title = escape(&alert.title),
            ts = alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
