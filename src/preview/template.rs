use super::{PreviewBuilder, PreviewContext};
use crate::{
    model::{TemplateVersionRecord, version_label},
    utils::{StyledLine, raw},
};

pub(super) fn render(tv: &TemplateVersionRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    let mut b = PreviewBuilder::new("Launch Template Version Details", ctx);

    b.section("Version").line(vec![raw(version_label(tv.version, tv.is_default))]);
    if !tv.description.is_empty() {
        b.section("Description").line(vec![raw(&tv.description)]);
    }

    b.section("Launch Template")
        .field("Name", &tv.meta.name)
        .field("ID", &tv.template_id);

    if tv.meta.created_at.is_some() || !tv.created_by.is_empty() {
        b.section("Metadata");
        if let Some(at) = tv.meta.created_at {
            b.field("Created", at.format("%Y-%m-%d %H:%M:%S").to_string());
        }
        b.field_opt("Created By", &tv.created_by);
    }

    b.build()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        model::{Record, RecordMeta, TemplateVersionRecord},
        preview::tests::plain,
    };

    #[test]
    fn test_template_version_preview() {
        let record = Record::TemplateVersion(TemplateVersionRecord {
            meta: RecordMeta {
                id: String::from("lt-0abc:3"),
                name: String::from("web-template"),
                ..Default::default()
            },
            template_id: String::from("lt-0abc"),
            version: 3,
            is_default: true,
            description: String::from("bump ami"),
            created_by: String::from("arn:aws:iam::123:user/ops"),
        });
        let lines = plain(&record, None);
        assert_eq!(&lines[2..5], &["", "Version:", "  3 (Default)"]);
        assert!(lines.contains(&String::from("  bump ami")));
        assert!(lines.contains(&String::from("  ID:                lt-0abc")));
        assert!(lines.contains(&String::from("  Created By:        arn:aws:iam::123:user/ops")));
        assert!(!lines.iter().any(|l| l.contains("Created:")));
    }
}
