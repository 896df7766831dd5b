use super::{Details, PreviewBuilder, PreviewContext};
use crate::{
    model::{ClusterRecord, Record},
    utils::{StyledLine, raw, span},
};

pub(super) fn render(record: &Record, cluster: &ClusterRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    if !cluster.needs_details() {
        return render_full(record, cluster, ctx);
    }
    match ctx.details {
        Some(Details::Loaded(full @ Record::Cluster(inner))) => render_full(full, inner, ctx),
        Some(Details::Failed(err)) => {
            let mut b = PreviewBuilder::new("Cluster Details", ctx);
            b.section("Basic Information").field("Name", record.display_name());
            b.lines.push(Vec::new());
            b.lines.push(vec![
                span("⚠", ctx.theme.warn),
                raw(" Failed to load full cluster details"),
            ]);
            b.field("Error", err).build()
        }
        _ => {
            let mut b = PreviewBuilder::new("Cluster Details", ctx);
            b.section("Basic Information")
                .field("Name", record.display_name())
                .comment("Loading cluster details...")
                .build()
        }
    }
}

fn render_full(record: &Record, cluster: &ClusterRecord, ctx: &PreviewContext<'_>) -> Vec<StyledLine> {
    let mut b = PreviewBuilder::new("Cluster Details", ctx);

    b.section("Basic Information").primary(record);

    b.section("API Server").field(
        "Endpoint",
        if cluster.endpoint.is_empty() { "-" } else { cluster.endpoint.as_str() },
    );

    b.section("Networking")
        .field_opt("VPC ID", &cluster.vpc_id)
        .field("Subnets", cluster.subnet_ids.len().to_string())
        .field("Security Groups", cluster.security_group_ids.len().to_string());

    b.section("Compute Resources")
        .field("Node Groups", cluster.node_groups.len().to_string())
        .field("Compute Profiles", cluster.compute_profiles.len().to_string());

    b.tags(&cluster.meta.tags).build()
}
