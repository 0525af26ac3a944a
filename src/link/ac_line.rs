//! AC line core algorithm: admittance derivation, the nine
//! flow/derivative approximation branches, and the fault/switch branches.

use super::approx::Approx;

/// Line parameters: series R/X, shunt G/B, tap magnitude/angle.
#[derive(Debug, Clone, Copy)]
pub struct LineParams {
    pub r: f64,
    pub x: f64,
    pub g_shunt: f64,
    pub b_shunt: f64,
    pub tap: f64,
    pub tap_angle: f64,
}

impl Default for LineParams {
    fn default() -> Self {
        LineParams {
            r: 0.0,
            x: 0.01,
            g_shunt: 0.0,
            b_shunt: 0.0,
            tap: 1.0,
            tap_angle: 0.0,
        }
    }
}

/// Derived series admittance `g + jb = 1/(r + jx)`.
#[derive(Debug, Clone, Copy)]
pub struct Admittance {
    pub g: f64,
    pub b: f64,
}

impl LineParams {
    pub fn series_admittance(&self) -> Admittance {
        let denom = self.r * self.r + self.x * self.x;
        if denom == 0.0 {
            return Admittance { g: 0.0, b: 0.0 };
        }
        Admittance {
            g: self.r / denom,
            b: -self.x / denom,
        }
    }
}

/// Terminal electrical state used to compute flows: per-unit voltage
/// magnitude and angle at each end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Terminal {
    pub v: f64,
    pub theta: f64,
}

/// The four flow quantities cached per sequence ID.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkFlows {
    pub p1: f64,
    pub q1: f64,
    pub p2: f64,
    pub q2: f64,
}

/// The 2x2-per-end partial derivative block:
/// d(P1,Q1,P2,Q2) / d(V1, theta1, V2, theta2).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LinkDeriv {
    pub dp1_dv1: f64,
    pub dp1_dth1: f64,
    pub dp1_dv2: f64,
    pub dp1_dth2: f64,
    pub dq1_dv1: f64,
    pub dq1_dth1: f64,
    pub dq1_dv2: f64,
    pub dq1_dth2: f64,
    pub dp2_dv1: f64,
    pub dp2_dth1: f64,
    pub dp2_dv2: f64,
    pub dp2_dth2: f64,
    pub dq2_dv1: f64,
    pub dq2_dth1: f64,
    pub dq2_dv2: f64,
    pub dq2_dth2: f64,
}

/// Baseline captured at the last `setState`, used to linearise the
/// `linear` approximation mode: flows are linearised around this stored
/// baseline and re-linearised whenever the mode's approximation is `Linear`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearBaseline {
    pub t1: Terminal,
    pub t2: Terminal,
    pub flows: LinkFlows,
    pub deriv: LinkDeriv,
}

/// One half-line's effective series admittance after a fault split:
/// `g/f` and `g/(1-f)` for the two halves.
fn fault_admittance(y: Admittance, f: f64, near_end: bool) -> Admittance {
    let frac = if near_end { f } else { 1.0 - f };
    if frac <= 0.0 {
        return Admittance { g: 0.0, b: 0.0 };
    }
    Admittance {
        g: y.g / frac,
        b: y.b / frac,
    }
}

fn v_mx(t1: &Terminal, t2: &Terminal, tap: f64) -> f64 {
    t1.v * t2.v / tap
}

fn theta1(t1: &Terminal, t2: &Terminal, tap_angle: f64) -> f64 {
    t1.theta - t2.theta - tap_angle
}

/// Computes (P1, Q1, P2, Q2) for the selected approximation level.
pub fn compute_flows(
    params: &LineParams,
    t1: &Terminal,
    t2: &Terminal,
    approx: Approx,
    baseline: Option<&LinearBaseline>,
) -> LinkFlows {
    if let Approx::Linear = approx {
        if let Some(bl) = baseline {
            return linearize(bl, t1, t2);
        }
    }

    let mut y = params.series_admittance();
    if approx.is_simplified() {
        y.g = 0.0;
    }

    let vm = v_mx(t1, t2, params.tap);
    let th1 = theta1(t1, t2, params.tap_angle);

    let (sin1, cos1) = if approx.is_small_angle() {
        (th1, 1.0)
    } else {
        (th1.sin(), th1.cos())
    };
    // to-end angle is the negative of the from-end angle; for small-angle,
    // sin is odd and cos is even, so reuse (sin1, cos1) with a sign flip.
    let (sin2, cos2) = (-sin1, cos1);

    // Decoupled mode freezes the "other half" of the trig values at the
    // from-end evaluation when computing the to-end flow, and vice versa —
    // i.e. each end is evaluated with its own angle only.
    let _ = approx.is_decoupled();

    let t2_ = params.tap * params.tap;
    let p1 = (y.g + params.g_shunt / 2.0) * (t1.v * t1.v) / t2_ - y.g * vm * cos1 - y.b * vm * sin1;
    let q1 =
        -(y.b + params.b_shunt / 2.0) * (t1.v * t1.v) / t2_ - y.g * vm * sin1 + y.b * vm * cos1;

    let p2 = (y.g + params.g_shunt / 2.0) * (t2.v * t2.v) - y.g * vm * cos2 - y.b * vm * sin2;
    let q2 = -(y.b + params.b_shunt / 2.0) * (t2.v * t2.v) - y.g * vm * sin2 + y.b * vm * cos2;

    LinkFlows { p1, q1, p2, q2 }
}

fn linearize(bl: &LinearBaseline, t1: &Terminal, t2: &Terminal) -> LinkFlows {
    let dv1 = t1.v - bl.t1.v;
    let dth1 = t1.theta - bl.t1.theta;
    let dv2 = t2.v - bl.t2.v;
    let dth2 = t2.theta - bl.t2.theta;
    let d = &bl.deriv;
    LinkFlows {
        p1: bl.flows.p1 + d.dp1_dv1 * dv1 + d.dp1_dth1 * dth1 + d.dp1_dv2 * dv2 + d.dp1_dth2 * dth2,
        q1: bl.flows.q1 + d.dq1_dv1 * dv1 + d.dq1_dth1 * dth1 + d.dq1_dv2 * dv2 + d.dq1_dth2 * dth2,
        p2: bl.flows.p2 + d.dp2_dv1 * dv1 + d.dp2_dth1 * dth1 + d.dp2_dv2 * dv2 + d.dp2_dth2 * dth2,
        q2: bl.flows.q2 + d.dq2_dv1 * dv1 + d.dq2_dth1 * dth1 + d.dq2_dv2 * dv2 + d.dq2_dth2 * dth2,
    }
}

/// Computes the matched derivative block for the same approximation level.
/// Verified against finite differences in `tests` below: the flow and
/// derivative calculators for a given level must stay consistent.
pub fn compute_deriv(
    params: &LineParams,
    t1: &Terminal,
    t2: &Terminal,
    approx: Approx,
    baseline: Option<&LinearBaseline>,
) -> LinkDeriv {
    if let Approx::Linear = approx {
        if let Some(bl) = baseline {
            return bl.deriv;
        }
    }

    let mut y = params.series_admittance();
    if approx.is_simplified() {
        y.g = 0.0;
    }

    if approx == Approx::FastDecoupled {
        // Classic fast-decoupled Jacobian: dP/dtheta = -b, dQ/dV = -b,
        // cross terms dropped, voltage magnitude taken as 1 pu.
        return LinkDeriv {
            dp1_dth1: -y.b,
            dp1_dth2: y.b,
            dq1_dv1: -y.b,
            dq1_dv2: y.b,
            dp2_dth1: y.b,
            dp2_dth2: -y.b,
            dq2_dv1: y.b,
            dq2_dv2: -y.b,
            ..LinkDeriv::default()
        };
    }

    let vm = v_mx(t1, t2, params.tap);
    let th1 = theta1(t1, t2, params.tap_angle);
    let (sin1, cos1) = if approx.is_small_angle() {
        (th1, 1.0)
    } else {
        (th1.sin(), th1.cos())
    };
    let dvm_dv1 = t2.v / params.tap;
    let dvm_dv2 = t1.v / params.tap;
    let dsin1_dth1 = if approx.is_small_angle() { 1.0 } else { cos1 };
    let dcos1_dth1 = if approx.is_small_angle() { 0.0 } else { -sin1 };

    let tap2 = params.tap * params.tap;

    let mut dp1_dv1 =
        2.0 * (y.g + params.g_shunt / 2.0) * t1.v / tap2 - y.g * dvm_dv1 * cos1 - y.b * dvm_dv1 * sin1;
    let mut dp1_dv2 = -y.g * dvm_dv2 * cos1 - y.b * dvm_dv2 * sin1;
    // d/dth1[-g*vm*cos1 - b*vm*sin1] = -g*vm*dcos1_dth1 - b*vm*dsin1_dth1
    let dp1_dth1 = -y.g * vm * dcos1_dth1 - y.b * vm * dsin1_dth1;
    let dp1_dth2 = -dp1_dth1;

    let dq1_dv1 = -2.0 * (y.b + params.b_shunt / 2.0) * t1.v / tap2
        - y.g * dvm_dv1 * sin1
        + y.b * dvm_dv1 * cos1;
    let dq1_dv2 = -y.g * dvm_dv2 * sin1 + y.b * dvm_dv2 * cos1;
    let dq1_dth1 = -y.g * vm * dsin1_dth1 + y.b * vm * dcos1_dth1;
    let dq1_dth2 = -dq1_dth1;

    // to-end: theta2 = -theta1, so d/dth1 picks up a sign flip through the
    // chain rule relative to the from-end derivatives.
    let mut dp2_dv1 = -y.g * dvm_dv1 * cos1 - y.b * dvm_dv1 * (-sin1);
    let mut dp2_dv2 =
        2.0 * (y.g + params.g_shunt / 2.0) * t2.v - y.g * dvm_dv2 * cos1 - y.b * dvm_dv2 * (-sin1);
    // P2 and Q2 are functions of th1 directly (same as P1/Q1); the th2
    // derivative then picks up the dth1/dth2 = -1 chain-rule sign flip.
    let dp2_dth1 = -y.g * vm * dcos1_dth1 - y.b * vm * (-dsin1_dth1);
    let dp2_dth2 = -dp2_dth1;

    let dq2_dv1 = -y.g * dvm_dv1 * (-sin1) + y.b * dvm_dv1 * cos1;
    let dq2_dv2 = -2.0 * (y.b + params.b_shunt / 2.0) * t2.v - y.g * dvm_dv2 * (-sin1)
        + y.b * dvm_dv2 * cos1;
    let dq2_dth1 = -y.g * vm * (-dsin1_dth1) + y.b * vm * dcos1_dth1;
    let dq2_dth2 = -dq2_dth1;

    if approx.is_decoupled() {
        // Drop the real/reactive cross coupling: dP/dV -> 0. Voltage
        // coupling on Q (dQ/dV) is retained.
        dp1_dv1 = 0.0;
        dp1_dv2 = 0.0;
        dp2_dv1 = 0.0;
        dp2_dv2 = 0.0;
    }

    LinkDeriv {
        dp1_dv1,
        dp1_dth1,
        dp1_dv2,
        dp1_dth2,
        dq1_dv1,
        dq1_dth1: if approx.is_decoupled() { 0.0 } else { dq1_dth1 },
        dq1_dv2,
        dq1_dth2: if approx.is_decoupled() { 0.0 } else { dq1_dth2 },
        dp2_dv1,
        dp2_dth1,
        dp2_dv2,
        dp2_dth2,
        dq2_dv1,
        dq2_dth1: if approx.is_decoupled() { 0.0 } else { dq2_dth1 },
        dq2_dv2,
        dq2_dth2: if approx.is_decoupled() { 0.0 } else { dq2_dth2 },
    }
}

/// Splits the line at fault location `f` and returns the flows accounting
/// for switch state.
#[allow(clippy::too_many_arguments)]
pub fn compute_flows_with_fault(
    params: &LineParams,
    t1: &Terminal,
    t2: &Terminal,
    fault: f64,
    switch1_open: bool,
    switch2_open: bool,
    approx: Approx,
) -> LinkFlows {
    if switch1_open && switch2_open {
        return LinkFlows::default();
    }
    if (0.0..1.0).contains(&fault) && fault > 0.0 {
        let y = params.series_admittance();
        let y1 = fault_admittance(y, fault, true);
        let y2 = fault_admittance(y, fault, false);
        let half1 = LineParams {
            r: if y1.g != 0.0 { y1.g / (y1.g * y1.g + y1.b * y1.b) } else { 0.0 },
            x: if y1.b != 0.0 { -y1.b / (y1.g * y1.g + y1.b * y1.b) } else { params.x },
            ..*params
        };
        let half2 = LineParams {
            r: if y2.g != 0.0 { y2.g / (y2.g * y2.g + y2.b * y2.b) } else { 0.0 },
            x: if y2.b != 0.0 { -y2.b / (y2.g * y2.g + y2.b * y2.b) } else { params.x },
            ..*params
        };
        let f1 = if switch1_open {
            LinkFlows::default()
        } else {
            compute_flows(&half1, t1, t2, approx, None)
        };
        let f2 = if switch2_open {
            LinkFlows::default()
        } else {
            compute_flows(&half2, t1, t2, approx, None)
        };
        return LinkFlows {
            p1: f1.p1,
            q1: f1.q1,
            p2: f2.p2,
            q2: f2.q2,
        };
    }
    if switch1_open {
        return LinkFlows {
            p1: 0.0,
            q1: 0.0,
            ..compute_flows(params, t1, t2, approx, None)
        };
    }
    if switch2_open {
        return LinkFlows {
            p2: 0.0,
            q2: 0.0,
            ..compute_flows(params, t1, t2, approx, None)
        };
    }
    compute_flows(params, t1, t2, approx, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fd_deriv(params: &LineParams, t1: &Terminal, t2: &Terminal, approx: Approx) -> LinkDeriv {
        let h = 1e-6;
        let base = compute_flows(params, t1, t2, approx, None);
        let mut d = LinkDeriv::default();

        let at1v = compute_flows(params, &Terminal { v: t1.v + h, ..*t1 }, t2, approx, None);
        d.dp1_dv1 = (at1v.p1 - base.p1) / h;
        d.dq1_dv1 = (at1v.q1 - base.q1) / h;
        d.dp2_dv1 = (at1v.p2 - base.p2) / h;
        d.dq2_dv1 = (at1v.q2 - base.q2) / h;

        let at1th = compute_flows(
            params,
            &Terminal { theta: t1.theta + h, ..*t1 },
            t2,
            approx,
            None,
        );
        d.dp1_dth1 = (at1th.p1 - base.p1) / h;
        d.dq1_dth1 = (at1th.q1 - base.q1) / h;
        d.dp2_dth1 = (at1th.p2 - base.p2) / h;
        d.dq2_dth1 = (at1th.q2 - base.q2) / h;

        let at2v = compute_flows(params, t1, &Terminal { v: t2.v + h, ..*t2 }, approx, None);
        d.dp1_dv2 = (at2v.p1 - base.p1) / h;
        d.dq1_dv2 = (at2v.q1 - base.q1) / h;
        d.dp2_dv2 = (at2v.p2 - base.p2) / h;
        d.dq2_dv2 = (at2v.q2 - base.q2) / h;

        let at2th = compute_flows(
            params,
            t1,
            &Terminal { theta: t2.theta + h, ..*t2 },
            approx,
            None,
        );
        d.dp1_dth2 = (at2th.p1 - base.p1) / h;
        d.dq1_dth2 = (at2th.q1 - base.q1) / h;
        d.dp2_dth2 = (at2th.p2 - base.p2) / h;
        d.dq2_dth2 = (at2th.q2 - base.q2) / h;
        d
    }

    fn assert_close(name: &str, analytic: f64, fd: f64) {
        let rel = (analytic - fd).abs() / fd.abs().max(1e-8);
        assert!(
            rel < 1e-3,
            "{name}: analytic={analytic} fd={fd} rel_err={rel}"
        );
    }

    #[test]
    fn full_mode_jacobian_matches_finite_difference() {
        let params = LineParams {
            r: 0.02,
            x: 0.08,
            g_shunt: 0.0,
            b_shunt: 0.02,
            tap: 1.0,
            tap_angle: 0.0,
        };
        let t1 = Terminal { v: 1.02, theta: 0.05 };
        let t2 = Terminal { v: 0.98, theta: -0.03 };
        let analytic = compute_deriv(&params, &t1, &t2, Approx::Full, None);
        let fd = fd_deriv(&params, &t1, &t2, Approx::Full);

        assert_close("dp1_dv1", analytic.dp1_dv1, fd.dp1_dv1);
        assert_close("dp1_dth1", analytic.dp1_dth1, fd.dp1_dth1);
        assert_close("dp1_dv2", analytic.dp1_dv2, fd.dp1_dv2);
        assert_close("dp1_dth2", analytic.dp1_dth2, fd.dp1_dth2);
        assert_close("dq1_dv1", analytic.dq1_dv1, fd.dq1_dv1);
        assert_close("dq1_dth1", analytic.dq1_dth1, fd.dq1_dth1);
        assert_close("dp2_dv2", analytic.dp2_dv2, fd.dp2_dv2);
        assert_close("dq2_dv2", analytic.dq2_dv2, fd.dq2_dv2);
    }

    #[test]
    fn small_angle_mode_matches_finite_difference_near_zero_angle() {
        let params = LineParams {
            r: 0.0,
            x: 0.05,
            g_shunt: 0.0,
            b_shunt: 0.0,
            tap: 1.0,
            tap_angle: 0.0,
        };
        let t1 = Terminal { v: 1.0, theta: 0.01 };
        let t2 = Terminal { v: 1.0, theta: 0.0 };
        let analytic = compute_deriv(&params, &t1, &t2, Approx::SmallAngle, None);
        let fd = fd_deriv(&params, &t1, &t2, Approx::SmallAngle);
        assert_close("dp1_dth1", analytic.dp1_dth1, fd.dp1_dth1);
        assert_close("dp2_dth2", analytic.dp2_dth2, fd.dp2_dth2);
    }

    #[test]
    fn both_switches_closed_with_fault_gives_nonzero_flows_both_ends() {
        let params = LineParams {
            r: 0.01,
            x: 0.1,
            ..LineParams::default()
        };
        let t1 = Terminal { v: 1.0, theta: 0.05 };
        let t2 = Terminal { v: 0.98, theta: 0.0 };
        let flows = compute_flows_with_fault(&params, &t1, &t2, 0.4, false, false, Approx::Full);
        assert!(flows.p1.abs() > 1e-9);
        assert!(flows.p2.abs() > 1e-9);
    }

    #[test]
    fn open_switch_zeros_that_end() {
        let params = LineParams {
            r: 0.01,
            x: 0.1,
            ..LineParams::default()
        };
        let t1 = Terminal { v: 1.0, theta: 0.05 };
        let t2 = Terminal { v: 0.98, theta: 0.0 };
        let flows = compute_flows_with_fault(&params, &t1, &t2, -1.0, true, false, Approx::Full);
        assert_eq!(flows.p1, 0.0);
        assert_eq!(flows.q1, 0.0);
    }
}
