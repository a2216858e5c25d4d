//! Built-in template set, one English and one Turkish variant per template.

use crate::types::{Template, TemplateField};

const PRIORITIES: &[&str] = &["low", "medium", "high"];
const SEVERITIES: &[&str] = &["critical", "high", "medium", "low"];
const ENVIRONMENTS: &[&str] = &["development", "staging", "production"];
const EFFORT: &[&str] = &["small", "medium", "large"];

struct Localized {
    name: &'static str,
    category: &'static str,
    description: &'static str,
    title: &'static str,
    body: &'static str,
    default_tags: &'static str,
}

struct SeedGroup {
    base: &'static str,
    alias: &'static str,
    en: Localized,
    tr: Localized,
    fields: fn() -> Vec<TemplateField>,
}

fn priority_field() -> TemplateField {
    TemplateField::select("priority", false, PRIORITIES, Some("medium"))
}

fn bug_report_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::select("severity", true, SEVERITIES, None),
        TemplateField::text("description", false).with_default(""),
        TemplateField::text("module", false).with_default("general"),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn bug_report_detailed_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("description", true),
        TemplateField::text("module", true),
        TemplateField::select("environment", true, ENVIRONMENTS, None),
        TemplateField::text("steps", true),
        TemplateField::text("expected", true),
        TemplateField::text("actual", true),
        TemplateField::text("attachments", false).with_default("-"),
        TemplateField::text("solution", false).with_default("-"),
        TemplateField::select("severity", false, SEVERITIES, Some("medium")),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn feature_request_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("description", true),
        TemplateField::text("purpose", true),
        TemplateField::text("users", false).with_default("-"),
        TemplateField::text("criteria", false).with_default("-"),
        TemplateField::select("effort", false, EFFORT, None),
        TemplateField::date("due_date", false),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn tech_debt_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("description", true),
        TemplateField::text("area", true),
        TemplateField::text("reason", false).with_default("-"),
        TemplateField::text("solution", false).with_default("-"),
        TemplateField::number("estimated_hours", false),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn research_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("topic", true),
        TemplateField::text("goal", true),
        TemplateField::text("questions", false).with_default("-"),
        TemplateField::text("criteria", false).with_default("-"),
        TemplateField::date("due_date", false),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn performance_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("metric_affected", true),
        TemplateField::text("current_value", false).with_default("?"),
        TemplateField::text("target_value", false).with_default("?"),
        TemplateField::text("description", false).with_default(""),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

fn security_fix_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("vulnerability_type", true),
        TemplateField::select("severity", true, SEVERITIES, None),
        TemplateField::text("affected_components", false).with_default("-"),
        TemplateField::text("description", false).with_default(""),
        TemplateField::select("priority", false, PRIORITIES, Some("high")),
        TemplateField::text("tags", false),
    ]
}

fn refactoring_fields() -> Vec<TemplateField> {
    vec![
        TemplateField::text("title", true),
        TemplateField::text("code_smell", true),
        TemplateField::text("files", false).with_default("-"),
        TemplateField::text("strategy", false).with_default("-"),
        TemplateField::text("risks", false).with_default("-"),
        priority_field(),
        TemplateField::text("tags", false),
    ]
}

const SEED_GROUPS: &[SeedGroup] = &[
    SeedGroup {
        base: "bug-report",
        alias: "bug_report",
        en: Localized {
            name: "Bug Report",
            category: "Bug",
            description: "Short template for reporting a bug",
            title: "🐛 [{{module}}] {{title}}",
            body: "## Bug\n{{description}}\n\n**Severity:** {{severity}}\n**Module:** {{module}}",
            default_tags: "bug",
        },
        tr: Localized {
            name: "Hata Raporu",
            category: "Hata",
            description: "Hata bildirmek için kısa şablon",
            title: "🐛 [{{module}}] {{title}}",
            body: "## Hata\n{{description}}\n\n**Önem:** {{severity}}\n**Modül:** {{module}}",
            default_tags: "bug",
        },
        fields: bug_report_fields,
    },
    SeedGroup {
        base: "bug-report-detailed",
        alias: "bug_report_detailed",
        en: Localized {
            name: "Detailed Bug Report",
            category: "Bug",
            description: "Detailed template for software bug reporting",
            title: "🐛 [{{severity}}] {{module}}: {{title}}",
            body: "## Description\n{{description}}\n\n**Module:** {{module}}\n**Environment:** {{environment}}\n\n\
                   ## Steps to Reproduce\n{{steps}}\n\n## Expected\n{{expected}}\n\n## Actual\n{{actual}}\n\n\
                   ## Attachments\n{{attachments}}\n\n## Possible Solution\n{{solution}}",
            default_tags: "bug",
        },
        tr: Localized {
            name: "Detaylı Hata Raporu",
            category: "Hata",
            description: "Yazılım hataları için detaylı şablon",
            title: "🐛 [{{severity}}] {{module}}: {{title}}",
            body: "## Açıklama\n{{description}}\n\n**Modül:** {{module}}\n**Ortam:** {{environment}}\n\n\
                   ## Tekrar Üretme Adımları\n{{steps}}\n\n## Beklenen\n{{expected}}\n\n## Gerçekleşen\n{{actual}}\n\n\
                   ## Ekler\n{{attachments}}\n\n## Olası Çözüm\n{{solution}}",
            default_tags: "bug",
        },
        fields: bug_report_detailed_fields,
    },
    SeedGroup {
        base: "feature-request",
        alias: "feature_request",
        en: Localized {
            name: "Feature Request",
            category: "Feature",
            description: "Template for new features and improvements",
            title: "✨ {{title}}",
            body: "## Description\n{{description}}\n\n## Purpose\n{{purpose}}\n\n## Users\n{{users}}\n\n\
                   ## Acceptance Criteria\n{{criteria}}\n\n**Effort:** {{effort}}",
            default_tags: "feature",
        },
        tr: Localized {
            name: "Özellik İsteği",
            category: "Özellik",
            description: "Yeni özellik ve iyileştirmeler için şablon",
            title: "✨ {{title}}",
            body: "## Açıklama\n{{description}}\n\n## Amaç\n{{purpose}}\n\n## Kullanıcılar\n{{users}}\n\n\
                   ## Kabul Kriterleri\n{{criteria}}\n\n**Efor:** {{effort}}",
            default_tags: "özellik",
        },
        fields: feature_request_fields,
    },
    SeedGroup {
        base: "tech-debt",
        alias: "tech_debt",
        en: Localized {
            name: "Technical Debt",
            category: "Technical",
            description: "Template for tracking technical debt",
            title: "🔧 [{{area}}] {{title}}",
            body: "## Description\n{{description}}\n\n## Why It Matters\n{{reason}}\n\n## Proposed Solution\n{{solution}}\n\n\
                   **Estimated hours:** {{estimated_hours}}",
            default_tags: "tech-debt",
        },
        tr: Localized {
            name: "Teknik Borç",
            category: "Teknik",
            description: "Teknik borç takibi için şablon",
            title: "🔧 [{{area}}] {{title}}",
            body: "## Açıklama\n{{description}}\n\n## Neden Önemli\n{{reason}}\n\n## Önerilen Çözüm\n{{solution}}\n\n\
                   **Tahmini saat:** {{estimated_hours}}",
            default_tags: "teknik-borç",
        },
        fields: tech_debt_fields,
    },
    SeedGroup {
        base: "research",
        alias: "research",
        en: Localized {
            name: "Research Spike",
            category: "Research",
            description: "Time-boxed investigation of an open question",
            title: "🔍 {{topic}} Research",
            body: "## Goal\n{{goal}}\n\n## Questions\n{{questions}}\n\n## Evaluation Criteria\n{{criteria}}",
            default_tags: "research",
        },
        tr: Localized {
            name: "Araştırma",
            category: "Araştırma",
            description: "Açık bir soru için süreli araştırma",
            title: "🔍 {{topic}} Araştırması",
            body: "## Amaç\n{{goal}}\n\n## Sorular\n{{questions}}\n\n## Değerlendirme Kriterleri\n{{criteria}}",
            default_tags: "araştırma",
        },
        fields: research_fields,
    },
    SeedGroup {
        base: "performance",
        alias: "performance",
        en: Localized {
            name: "Performance Issue",
            category: "Technical",
            description: "Template for performance problems",
            title: "⚡ [PERF] {{metric_affected}}: {{title}}",
            body: "## Description\n{{description}}\n\n**Metric:** {{metric_affected}}\n\
                   **Current:** {{current_value}}\n**Target:** {{target_value}}",
            default_tags: "performance",
        },
        tr: Localized {
            name: "Performans Sorunu",
            category: "Teknik",
            description: "Performans sorunları için şablon",
            title: "⚡ [PERF] {{metric_affected}}: {{title}}",
            body: "## Açıklama\n{{description}}\n\n**Metrik:** {{metric_affected}}\n\
                   **Mevcut:** {{current_value}}\n**Hedef:** {{target_value}}",
            default_tags: "performans",
        },
        fields: performance_fields,
    },
    SeedGroup {
        base: "security-fix",
        alias: "security_fix",
        en: Localized {
            name: "Security Fix",
            category: "Security",
            description: "Template for security vulnerabilities",
            title: "🔒 [SEC-{{severity}}] {{vulnerability_type}}: {{title}}",
            body: "## Description\n{{description}}\n\n**Category:** {{vulnerability_type}}\n\
                   **Severity:** {{severity}}\n**Affected components:** {{affected_components}}",
            default_tags: "security",
        },
        tr: Localized {
            name: "Güvenlik Düzeltmesi",
            category: "Güvenlik",
            description: "Güvenlik açıkları için şablon",
            title: "🔒 [SEC-{{severity}}] {{vulnerability_type}}: {{title}}",
            body: "## Açıklama\n{{description}}\n\n**Kategori:** {{vulnerability_type}}\n\
                   **Önem:** {{severity}}\n**Etkilenen bileşenler:** {{affected_components}}",
            default_tags: "güvenlik",
        },
        fields: security_fix_fields,
    },
    SeedGroup {
        base: "refactoring",
        alias: "refactoring",
        en: Localized {
            name: "Refactoring",
            category: "Technical",
            description: "Template for planned code restructuring",
            title: "♻️ [REFACTOR] {{code_smell}}: {{title}}",
            body: "## Code Smell\n{{code_smell}}\n\n## Files\n{{files}}\n\n## Strategy\n{{strategy}}\n\n## Risks\n{{risks}}",
            default_tags: "refactoring",
        },
        tr: Localized {
            name: "Yeniden Düzenleme",
            category: "Teknik",
            description: "Planlı kod yeniden yapılandırması için şablon",
            title: "♻️ [REFACTOR] {{code_smell}}: {{title}}",
            body: "## Kod Kokusu\n{{code_smell}}\n\n## Dosyalar\n{{files}}\n\n## Strateji\n{{strategy}}\n\n## Riskler\n{{risks}}",
            default_tags: "refactoring",
        },
        fields: refactoring_fields,
    },
];

fn build(group: &SeedGroup, text: &Localized, language: &str) -> Template {
    let fields = (group.fields)()
        .into_iter()
        .map(|f| {
            if f.name == "tags" && f.default.is_none() {
                f.with_default(text.default_tags)
            } else {
                f
            }
        })
        .collect();
    Template {
        id: format!("{}-{}", group.base, language),
        name: text.name.to_string(),
        alias: Some(group.alias.to_string()),
        category: text.category.to_string(),
        description: text.description.to_string(),
        title_pattern: text.title.to_string(),
        body_pattern: text.body.to_string(),
        fields,
        active: true,
        language_code: language.to_string(),
        base_template_id: Some(group.base.to_string()),
        created_at: 0,
    }
}

/// All built-in templates, both languages.
pub fn default_templates() -> Vec<Template> {
    SEED_GROUPS
        .iter()
        .flat_map(|g| [build(g, &g.en, "en"), build(g, &g.tr, "tr")])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_group_has_both_languages() {
        let templates = default_templates();
        assert_eq!(templates.len(), SEED_GROUPS.len() * 2);

        let keys: HashSet<(String, String)> = templates
            .iter()
            .map(|t| (t.alias.clone().unwrap_or_default(), t.language_code.clone()))
            .collect();
        assert_eq!(keys.len(), templates.len());

        for pair in templates.chunks(2) {
            assert_eq!(pair[0].base_template_id, pair[1].base_template_id);
            assert_eq!(pair[0].fields.len(), pair[1].fields.len());
        }
    }

    #[test]
    fn basic_bug_report_shape() {
        let bug = default_templates()
            .into_iter()
            .find(|t| t.id == "bug-report-en")
            .unwrap();
        let required: Vec<&str> = bug
            .fields
            .iter()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(required, vec!["title", "severity"]);
        let tags = bug.fields.iter().find(|f| f.name == "tags").unwrap();
        assert_eq!(tags.default.as_deref(), Some("bug"));
    }
}
