use super::{PreviewBuilder, PreviewContext};
use crate::{
    model::{Record, VmRecord},
    utils::{StyledLine, format_age},
};

pub(super) fn render(record: &Record, vm: &VmRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    let mut b = PreviewBuilder::new("Instance Details", ctx);

    b.section("Basic Info").primary(record);
    if let Some(launched) = vm.meta.created_at {
        b.field("Uptime", format_age(ctx.now - launched));
    }

    b.section("Network");
    if [&vm.private_ip, &vm.public_ip, &vm.private_dns, &vm.public_dns]
        .iter()
        .all(|v| v.is_empty())
    {
        b.comment("No network information");
    }
    b.field_opt("Private IP", &vm.private_ip)
        .field_opt("Public IP", &vm.public_ip)
        .field_opt("Private DNS", &vm.private_dns)
        .field_opt("Public DNS", &vm.public_dns);

    if !vm.instance_profile.is_empty() || !vm.security_groups.is_empty() {
        b.section("Security").field_opt("Instance Profile", &vm.instance_profile);
        if !vm.security_groups.is_empty() {
            b.field("Security Groups", "");
            for sg in &vm.security_groups {
                b.bullet(4, sg);
            }
        }
    }

    b.tags(&vm.meta.tags).build()
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    use crate::{
        model::{Record, RecordMeta, Tags, VmRecord, VmState},
        preview::tests::plain,
        utils::{matches, parse_query},
    };

    fn web() -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: String::from("i-0a1b2c3d"),
                name: String::from("web-01"),
                created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
                tags: Tags::new([("Env", "prod"), ("Name", "web-01")]).unwrap(),
            },
            state: VmState::Running,
            instance_type: String::from("t3.micro"),
            availability_zone: String::from("eu-west-1a"),
            private_ip: String::from("10.0.1.15"),
            security_groups: vec![String::from("sg-web")],
            ..Default::default()
        })
    }

    #[test]
    fn test_vm_preview() {
        let record = web();
        assert!(matches(&record, &parse_query("name:web state:running tag:Env=prod")));

        let lines = plain(&record, None);
        assert_eq!(lines[0], "Instance Details");
        assert!(lines.contains(&String::from("  Name:              web-01")));
        assert!(lines.contains(&String::from("  State:             running")));
        assert!(lines.contains(&String::from("  Launch Time:       2024-03-01 10:00:00")));
        assert!(lines.contains(&String::from("  Uptime:            2d2h30m")));
        assert!(lines.contains(&String::from("  Private IP:        10.0.1.15")));
        assert!(!lines.iter().any(|l| l.contains("Public IP")));
        assert!(lines.contains(&String::from("    • sg-web")));
        // The name tag is already displayed
        assert_eq!(lines.last().map(String::as_str), Some("  Env=prod"));
    }

    #[test]
    fn test_vm_preview_without_details() {
        let lines = plain(&Record::placeholder(crate::model::RecordKind::Vm, "i-1"), None);
        assert!(lines.contains(&String::from("  Name:              (no name)")));
        assert!(lines.contains(&String::from("  No network information")));
        assert!(!lines.iter().any(|l| l == "Security:" || l == "Tags:"));
    }
}
