use super::{PreviewBuilder, PreviewContext};
use crate::{
    model::{Record, ScalingGroupRecord},
    utils::StyledLine,
};

pub(super) fn render(record: &Record, group: &ScalingGroupRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    let mut b = PreviewBuilder::new("Auto Scaling Group Details", ctx);

    b.section("Basic Information").primary(record);

    b.section("Scaling Configuration")
        .field("Desired Capacity", group.desired.to_string())
        .field("Min Size", group.min.to_string())
        .field("Max Size", group.max.to_string())
        .field("Current Size", group.current.to_string())
        .scaling(group.current, group.desired);

    b.section("Launch Configuration");
    match (&group.launch_template, &group.launch_configuration) {
        (Some(template), _) if template.version.is_empty() => b.field("Launch Template", &template.name),
        (Some(template), _) => b.field("Launch Template", format!("{} ({})", template.name, template.version)),
        (None, Some(config)) => b.field("Launch Config", config),
        (None, None) => b.field("Launch Config", "Not specified"),
    };

    if !group.availability_zones.is_empty() {
        b.section("Availability Zones");
        for az in &group.availability_zones {
            b.bullet(2, az);
        }
    }

    b.tags(&group.meta.tags).build()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{
        model::{GroupStatus, Record, RecordMeta, ScalingGroupRecord, TemplateRef},
        preview::tests::plain,
    };

    fn group(current: u32, desired: u32) -> Record {
        Record::ScalingGroup(ScalingGroupRecord {
            meta: RecordMeta {
                id: String::from("web-asg"),
                name: String::from("web-asg"),
                ..Default::default()
            },
            status: GroupStatus::Active,
            desired,
            min: 2,
            max: 10,
            current,
            launch_template: Some(TemplateRef {
                id: String::from("lt-1"),
                name: String::from("web-template"),
                version: String::from("$Latest"),
            }),
            availability_zones: vec![String::from("eu-west-1a"), String::from("eu-west-1b")],
            ..Default::default()
        })
    }

    #[test]
    fn test_scaling_up() {
        let lines = plain(&group(3, 5), None);
        assert_eq!(lines[0], "Auto Scaling Group Details");
        assert!(lines.contains(&String::from("  ⚠ scaling up (3 → 5)")));
        assert!(lines.contains(&String::from("  Desired Capacity:  5")));
        assert!(lines.contains(&String::from("  Launch Template:   web-template ($Latest)")));
        assert!(lines.contains(&String::from("  • eu-west-1b")));
    }

    #[test]
    fn test_scaling_annotations() {
        assert!(plain(&group(7, 5), None).contains(&String::from("  ⚠ scaling down (7 → 5)")));
        assert!(plain(&group(5, 5), None).contains(&String::from("  ✓ at desired capacity")));
        assert!(plain(&group(0, 0), None).contains(&String::from("  ○ scaled to zero")));
    }
}
