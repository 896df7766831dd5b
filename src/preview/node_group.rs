use super::{PreviewBuilder, PreviewContext};
use crate::{
    model::{NodeGroupRecord, Record},
    utils::StyledLine,
};

pub(super) fn render(record: &Record, ng: &NodeGroupRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    let mut b = PreviewBuilder::new("Node Group Details", ctx);

    b.section("Basic Information").primary(record);

    b.section("Scaling Configuration")
        .field("Desired Size", ng.desired.to_string())
        .field("Min Size", ng.min.to_string())
        .field("Max Size", ng.max.to_string())
        .field("Current Size", ng.current.to_string())
        .scaling(ng.current, ng.desired);

    b.section("Instance Configuration");
    if !ng.instance_types.is_empty() {
        b.field("Instance Types", "");
        for instance_type in &ng.instance_types {
            b.bullet(4, instance_type);
        }
    } else if let Some(template) = &ng.launch_template {
        b.field("Launch Template", &template.name)
            .field("Instance Types", "(defined in launch template)");
    } else {
        b.field("Instance Types", "Not specified");
    }

    b.tags(&ng.meta.tags).build()
}

#[cfg(test)]
mod tests {
    use crate::{
        model::{NodeGroupRecord, NodeGroupStatus, Record, RecordMeta, TemplateRef},
        preview::tests::plain,
    };

    #[test]
    fn test_node_group_preview() {
        let mut ng = NodeGroupRecord {
            meta: RecordMeta {
                id: String::from("prod/workers"),
                name: String::from("workers"),
                ..Default::default()
            },
            cluster: String::from("prod"),
            status: NodeGroupStatus::Active,
            desired: 3,
            min: 1,
            max: 5,
            current: 3,
            instance_types: vec![String::from("m5.large")],
            ..Default::default()
        };
        let lines = plain(&Record::NodeGroup(ng.clone()), None);
        assert!(lines.contains(&String::from("  Cluster:           prod")));
        assert!(lines.contains(&String::from("  ✓ at desired capacity")));
        assert!(lines.contains(&String::from("    • m5.large")));

        ng.instance_types.clear();
        ng.launch_template = Some(TemplateRef {
            name: String::from("workers-lt"),
            ..Default::default()
        });
        let lines = plain(&Record::NodeGroup(ng), None);
        assert!(lines.contains(&String::from("  Launch Template:   workers-lt")));
        assert!(lines.contains(&String::from("  Instance Types:    (defined in launch template)")));
    }
}
