/// HTML body of the digest email, rendered with `minijinja::render!`.
/// Context: `period_name`, `date_line`, `email_count`,
/// `high_priority_count`, `truncated`, and `sections`, a list of
/// `{ title, items }` groups where each item carries the display fields
/// of one summary.
pub const DIGEST_EMAIL_TEMPLATE: &str = r##"
<html>
<head>
<style>
    body { font-family: Arial, sans-serif; margin: 0; padding: 20px; color: #333; }
    .container { max-width: 800px; margin: 0 auto; }
    .header { padding: 20px; background-color: #f5f5f5; border-bottom: 1px solid #ddd; }
    .email-item { margin-bottom: 20px; padding: 15px; border-left: 4px solid #ccc; background-color: #f9f9f9; }
    .email-item.high { border-left-color: #ff4d4d; }
    .email-item.medium { border-left-color: #ffad33; }
    .email-item.low { border-left-color: #2ecc71; }
    .email-sender { font-weight: bold; }
    .email-subject { font-size: 16px; margin: 5px 0; }
    .email-time { color: #888; font-size: 12px; }
    .action-items { margin-top: 10px; color: #e74c3c; }
    .degraded { color: #888; font-style: italic; }
    ul { padding-left: 20px; }
    li { margin-bottom: 5px; }
    .priority-tag { display: inline-block; padding: 3px 8px; border-radius: 3px; font-size: 12px; color: white; }
    .priority-high { background-color: #ff4d4d; }
    .priority-medium { background-color: #ffad33; }
    .priority-low { background-color: #2ecc71; }
</style>
</head>
<body>
<div class="container">
    <div class="header">
        <h1>{{ period_name }} Email Digest</h1>
        <p>{{ date_line }}</p>
        <p>Total emails: {{ email_count }} | High priority: {{ high_priority_count }}</p>
        {% if truncated > 0 %}
        <p><em>{{ truncated }} older emails were omitted to keep this digest within its cap.</em></p>
        {% endif %}
    </div>
    {% if email_count == 0 %}
    <p>No new emails during this period.</p>
    {% endif %}
    {% for section in sections %}
    <h2>{{ section.title }}</h2>
    {% for item in section.items %}
    <div class="email-item {{ item.priority_class }}">
        <div class="email-sender">{{ item.sender }}</div>
        <div class="email-subject">{{ item.subject }}</div>
        <div class="email-time">{{ item.time }}</div>
        <span class="priority-tag priority-{{ item.priority_class }}">{{ item.priority }}</span>
        {% if item.degraded %}
        <p class="degraded">Automatic summarization was unavailable for this email.</p>
        {% endif %}
        {% if item.key_points %}
        <div class="key-points">
            <strong>Key Points:</strong>
            <ul>
            {% for point in item.key_points %}<li>{{ point }}</li>{% endfor %}
            </ul>
        </div>
        {% endif %}
        {% if item.action_items %}
        <div class="action-items">
            <strong>Action Items:</strong>
            <ul>
            {% for action in item.action_items %}<li>{{ action }}</li>{% endfor %}
            </ul>
        </div>
        {% endif %}
    </div>
    {% endfor %}
    {% endfor %}
</div>
</body>
</html>
"##;
