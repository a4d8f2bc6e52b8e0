use crate::base::{Error, Result};
use crate::types::MeasurementNode;
use log::trace;

/// Reorders one revolution into ascending angle order.
///
/// Nodes without a return (`dist_mm_q2 == 0`) carry unreliable angles, so they are
/// first given the angle their position implies, using the nominal increment of
/// `360 / nodes.len()` degrees: the leading ones are extrapolated backwards from the
/// first valid node, the others forward from the first node. The nodes are then
/// stable-sorted by angle.
///
/// Fails with `OperationFail` if no node carries a distance.
pub fn ascend_scan_data(nodes: &mut [MeasurementNode]) -> Result<()> {
    trace!("ascend_scan_data called with {} nodes", nodes.len());
    let count = nodes.len();
    let inc_origin_angle = 360f32 / count as f32;

    let first_valid = match nodes.iter().position(|n| n.dist_mm_q2 != 0) {
        Some(idx) => idx,
        None => {
            trace!("No valid nodes in scan, cannot ascend");
            return Err(Error::operation_fail("no valid nodes in scan"));
        }
    };

    // head
    for i in (0..first_valid).rev() {
        let expect_angle = (nodes[i + 1].angle_degrees() - inc_origin_angle).max(0f32);
        nodes[i].set_angle_degrees(expect_angle);
    }

    // tail
    if let Some(last_valid) = nodes.iter().rposition(|n| n.dist_mm_q2 != 0) {
        for i in last_valid + 1..count {
            let expect_angle = wrap_degrees(nodes[i - 1].angle_degrees() + inc_origin_angle);
            nodes[i].set_angle_degrees(expect_angle);
        }
    }

    // gaps
    let front_angle = nodes[0].angle_degrees();
    for (i, node) in nodes.iter_mut().enumerate().skip(1) {
        if node.dist_mm_q2 == 0 {
            node.set_angle_degrees(wrap_degrees(front_angle + i as f32 * inc_origin_angle));
        }
    }
    trace!(
        "Filled angles around first valid node {} (inc {:.4} deg)",
        first_valid,
        inc_origin_angle
    );

    nodes.sort_by_key(|n| n.angle_z_q14);
    Ok(())
}

#[inline]
fn wrap_degrees(angle: f32) -> f32 {
    if angle >= 360f32 {
        angle - 360f32
    } else {
        angle
    }
}
