//! Compute-pass recording for frustum culling. The math lives in
//! `prism_render::culling`; this module only turns cull requests into
//! dispatches against each asset's indirect replicas.

use prism_render::{CullRequest, CullView};
use prism_render::culling::dispatch_groups;

use crate::geometry::GpuAsset;

/// One workgroup dispatch over one asset's replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dispatch {
    pub asset: usize,
    pub slot: usize,
    pub groups: u32,
}

/// Dispatches for the requests targeting `view`. Empty draw sets produce none.
pub fn dispatches_for(requests: &[CullRequest], view: CullView) -> Vec<Dispatch> {
    requests
        .iter()
        .filter(|r| r.view == view)
        .filter_map(|r| {
            let groups = dispatch_groups(r.uniform.count);
            (groups > 0).then_some(Dispatch {
                asset: r.asset,
                slot: view.slot(),
                groups,
            })
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct FrustumCuller;

impl FrustumCuller {
    pub fn new() -> Self {
        Self
    }

    /// Upload the cull uniforms of `view`'s requests and record their
    /// dispatches in one compute pass. Returns the number of dispatches.
    pub fn record(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        assets: &[GpuAsset],
        requests: &[CullRequest],
        view: CullView,
    ) -> usize {
        for request in requests.iter().filter(|r| r.view == view) {
            if let Some(asset) = assets.get(request.asset) {
                asset.write_cull_uniform(queue, view.slot(), &request.uniform);
            }
        }

        let dispatches = dispatches_for(requests, view);
        if dispatches.is_empty() {
            return 0;
        }

        let label = match view {
            CullView::Main => "cull_main".to_string(),
            CullView::Cascade(i) => format!("cull_cascade_{i}"),
        };
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(&label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        let mut recorded = 0;
        for dispatch in &dispatches {
            let Some(group) = assets.get(dispatch.asset).and_then(|a| a.cull_group(dispatch.slot)) else {
                tracing::debug!(asset = dispatch.asset, "cull request for unknown asset skipped");
                continue;
            };
            pass.set_bind_group(0, group, &[]);
            pass.dispatch_workgroups(dispatch.groups, 1, 1);
            tracing::trace!(
                asset = dispatch.asset,
                slot = dispatch.slot,
                groups = dispatch.groups,
                "cull dispatch"
            );
            recorded += 1;
        }
        recorded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;
    use prism_render::CullUniform;

    fn request(asset: usize, view: CullView, count: u32) -> CullRequest {
        CullRequest {
            asset,
            view,
            uniform: CullUniform::new(&Mat4::IDENTITY, &Mat4::IDENTITY, 0.1, 10.0, count),
        }
    }

    #[test]
    fn only_matching_view_is_dispatched() {
        let requests = [
            request(0, CullView::Main, 40),
            request(0, CullView::Cascade(0), 40),
            request(1, CullView::Main, 3),
        ];
        let main = dispatches_for(&requests, CullView::Main);
        assert_eq!(
            main,
            vec![
                Dispatch { asset: 0, slot: 0, groups: 3 },
                Dispatch { asset: 1, slot: 0, groups: 1 },
            ]
        );
        let cascade = dispatches_for(&requests, CullView::Cascade(0));
        assert_eq!(cascade, vec![Dispatch { asset: 0, slot: 1, groups: 3 }]);
        assert!(dispatches_for(&requests, CullView::Cascade(2)).is_empty());
    }

    #[test]
    fn empty_sets_are_skipped() {
        let requests = [request(0, CullView::Main, 0)];
        assert!(dispatches_for(&requests, CullView::Main).is_empty());
    }
}
