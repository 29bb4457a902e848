//! Sphere and capsule contact queries against boxes and each other.
//!
//! Every query returns a [`Contact`] whose normal points from the other
//! shape toward the queried shape, so moving the queried shape by
//! `normal * depth` separates the two.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::bounds::Aabb;

const EPSILON: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Contact {
    /// Unit push-out direction for the queried shape.
    pub normal: Vec3,
    /// Penetration depth along `normal`, always positive.
    pub depth: f32,
    /// Contact point on the surface of the other shape.
    pub point: Vec3,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::new(self.center - Vec3::splat(self.radius), self.center + Vec3::splat(self.radius))
    }

    pub fn contact_aabb(&self, aabb: &Aabb) -> Option<Contact> {
        let closest = aabb.closest_point(self.center);
        let offset = self.center - closest;
        let dist_sq = offset.length_squared();
        if dist_sq > self.radius * self.radius {
            return None;
        }
        if dist_sq > EPSILON {
            let dist = dist_sq.sqrt();
            return Some(Contact {
                normal: offset / dist,
                depth: self.radius - dist,
                point: closest,
            });
        }

        // Centre inside the box: leave through the nearest face.
        let (normal, face_distance) = aabb.nearest_face(self.center);
        Some(Contact {
            normal,
            depth: self.radius + face_distance,
            point: self.center + normal * face_distance,
        })
    }

    pub fn contact_sphere(&self, other: &Sphere) -> Option<Contact> {
        sphere_pair(self.center, self.radius, other.center, other.radius)
    }
}

/// A capsule given by the two tips of its long axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Capsule {
    pub bottom: Vec3,
    pub top: Vec3,
    pub radius: f32,
}

impl Capsule {
    pub fn new(bottom: Vec3, top: Vec3, radius: f32) -> Self {
        Self { bottom, top, radius }
    }

    /// Centres of the two end caps. Both collapse to the midpoint when the
    /// capsule is shorter than its diameter.
    pub fn segment(&self) -> (Vec3, Vec3) {
        let axis = self.top - self.bottom;
        let length = axis.length();
        if length <= 2.0 * self.radius {
            let mid = (self.bottom + self.top) * 0.5;
            return (mid, mid);
        }
        let inset = axis / length * self.radius;
        (self.bottom + inset, self.top - inset)
    }

    pub fn bounds(&self) -> Aabb {
        let r = Vec3::splat(self.radius);
        let (a, b) = self.segment();
        Aabb::new(a.min(b) - r, a.max(b) + r)
    }

    pub fn contact_aabb(&self, aabb: &Aabb) -> Option<Contact> {
        let (a, b) = self.segment();
        // Alternating projection between the segment and the box converges
        // on the closest pair for these two convex sets.
        let mut on_segment = closest_on_segment(a, b, aabb.center());
        for _ in 0..4 {
            let on_box = aabb.closest_point(on_segment);
            let next = closest_on_segment(a, b, on_box);
            if next.distance_squared(on_segment) < EPSILON {
                break;
            }
            on_segment = next;
        }
        Sphere::new(on_segment, self.radius).contact_aabb(aabb)
    }

    pub fn contact_sphere(&self, sphere: &Sphere) -> Option<Contact> {
        let (a, b) = self.segment();
        let on_segment = closest_on_segment(a, b, sphere.center);
        sphere_pair(on_segment, self.radius, sphere.center, sphere.radius)
    }

    pub fn contact_capsule(&self, other: &Capsule) -> Option<Contact> {
        let (a0, a1) = self.segment();
        let (b0, b1) = other.segment();
        let (p, q) = closest_between_segments(a0, a1, b0, b1);
        sphere_pair(p, self.radius, q, other.radius)
    }
}

/// Either query shape, for callers that hold a mix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Collider {
    Sphere(Sphere),
    Capsule(Capsule),
}

impl Collider {
    pub fn bounds(&self) -> Aabb {
        match self {
            Self::Sphere(s) => s.bounds(),
            Self::Capsule(c) => c.bounds(),
        }
    }

    pub fn contact_aabb(&self, aabb: &Aabb) -> Option<Contact> {
        match self {
            Self::Sphere(s) => s.contact_aabb(aabb),
            Self::Capsule(c) => c.contact_aabb(aabb),
        }
    }
}

fn sphere_pair(center: Vec3, radius: f32, other: Vec3, other_radius: f32) -> Option<Contact> {
    let offset = center - other;
    let dist = offset.length();
    let reach = radius + other_radius;
    if dist > reach {
        return None;
    }
    let normal = if dist > EPSILON { offset / dist } else { Vec3::Y };
    Some(Contact {
        normal,
        depth: reach - dist,
        point: other + normal * other_radius,
    })
}

pub fn closest_on_segment(a: Vec3, b: Vec3, p: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq < EPSILON {
        return a;
    }
    a + ab * ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
}

/// Closest points between segments `p0-p1` and `q0-q1`.
pub fn closest_between_segments(p0: Vec3, p1: Vec3, q0: Vec3, q1: Vec3) -> (Vec3, Vec3) {
    let d1 = p1 - p0;
    let d2 = q1 - q0;
    let r = p0 - q0;
    let a = d1.length_squared();
    let e = d2.length_squared();
    let f = d2.dot(r);

    if a < EPSILON && e < EPSILON {
        return (p0, q0);
    }
    if a < EPSILON {
        return (p0, q0 + d2 * (f / e).clamp(0.0, 1.0));
    }
    let c = d1.dot(r);
    if e < EPSILON {
        return (p0 + d1 * (-c / a).clamp(0.0, 1.0), q0);
    }

    let b = d1.dot(d2);
    let denom = a * e - b * b;
    let mut s = if denom > EPSILON {
        ((b * f - c * e) / denom).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut t = (b * s + f) / e;
    if t < 0.0 {
        t = 0.0;
        s = (-c / a).clamp(0.0, 1.0);
    } else if t > 1.0 {
        t = 1.0;
        s = ((b - c) / a).clamp(0.0, 1.0);
    }
    (p0 + d1 * s, q0 + d2 * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb::new(Vec3::splat(-1.0), Vec3::splat(1.0))
    }

    fn close(a: Vec3, b: Vec3) -> bool {
        a.distance(b) < 1e-4
    }

    #[test]
    fn sphere_touching_a_face_pushes_along_that_face() {
        let sphere = Sphere::new(Vec3::new(0.0, 1.5, 0.0), 1.0);
        let contact = sphere.contact_aabb(&unit_box()).unwrap();
        assert!(close(contact.normal, Vec3::Y));
        assert!((contact.depth - 0.5).abs() < 1e-5);
        assert!(close(contact.point, Vec3::new(0.0, 1.0, 0.0)));
    }

    #[test]
    fn sphere_near_a_corner_pushes_diagonally() {
        let sphere = Sphere::new(Vec3::splat(1.5), 1.0);
        let contact = sphere.contact_aabb(&unit_box()).unwrap();
        assert!(close(contact.normal, Vec3::ONE.normalize()));
        assert!(close(contact.point, Vec3::ONE));
    }

    #[test]
    fn separated_sphere_has_no_contact() {
        assert!(Sphere::new(Vec3::new(3.0, 0.0, 0.0), 1.0).contact_aabb(&unit_box()).is_none());
        // Within the box's bounding sphere reach but outside the corner region.
        assert!(Sphere::new(Vec3::splat(1.7), 1.0).contact_aabb(&unit_box()).is_none());
    }

    #[test]
    fn buried_sphere_leaves_through_the_nearest_face() {
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, -0.8), 0.5);
        let contact = sphere.contact_aabb(&unit_box()).unwrap();
        assert!(close(contact.normal, Vec3::NEG_Z));
        assert!((contact.depth - 0.7).abs() < 1e-5);
        assert!(close(contact.point, Vec3::new(0.0, 0.0, -1.0)));
    }

    #[test]
    fn lying_capsule_resting_on_a_box() {
        let capsule = Capsule::new(Vec3::new(-3.0, 1.4, 0.0), Vec3::new(3.0, 1.4, 0.0), 0.5);
        let contact = capsule.contact_aabb(&unit_box()).unwrap();
        assert!(close(contact.normal, Vec3::Y));
        assert!((contact.depth - 0.1).abs() < 1e-4);
    }

    #[test]
    fn standing_capsule_beside_a_box() {
        let capsule = Capsule::new(Vec3::new(1.3, -5.0, 0.0), Vec3::new(1.3, 5.0, 0.0), 0.5);
        let contact = capsule.contact_aabb(&unit_box()).unwrap();
        assert!(close(contact.normal, Vec3::X));
        assert!((contact.depth - 0.2).abs() < 1e-4);

        let clear = Capsule::new(Vec3::new(1.6, -5.0, 0.0), Vec3::new(1.6, 5.0, 0.0), 0.5);
        assert!(clear.contact_aabb(&unit_box()).is_none());
    }

    #[test]
    fn short_capsule_degenerates_to_a_sphere() {
        let capsule = Capsule::new(Vec3::ZERO, Vec3::new(0.0, 0.5, 0.0), 0.5);
        let (a, b) = capsule.segment();
        assert_eq!(a, b);
        assert!(close(a, Vec3::new(0.0, 0.25, 0.0)));
    }

    #[test]
    fn capsule_segment_is_inset_by_radius() {
        let capsule = Capsule::new(Vec3::ZERO, Vec3::new(0.0, 4.0, 0.0), 1.0);
        assert_eq!(capsule.segment(), (Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 3.0, 0.0)));
        assert_eq!(capsule.bounds(), Aabb::new(Vec3::splat(-1.0), Vec3::new(1.0, 4.0, 1.0)));
    }

    #[test]
    fn crossing_capsules_touch_at_their_closest_points() {
        let a = Capsule::new(Vec3::new(-3.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0), 0.5);
        let b = Capsule::new(Vec3::new(0.0, 0.8, -3.0), Vec3::new(0.0, 0.8, 3.0), 0.5);
        let contact = a.contact_capsule(&b).unwrap();
        assert!(close(contact.normal, Vec3::NEG_Y));
        assert!((contact.depth - 0.2).abs() < 1e-4);

        let far = Capsule::new(Vec3::new(0.0, 1.2, -3.0), Vec3::new(0.0, 1.2, 3.0), 0.5);
        assert!(a.contact_capsule(&far).is_none());
    }

    #[test]
    fn sphere_pairs_report_symmetric_normals() {
        let a = Sphere::new(Vec3::ZERO, 1.0);
        let b = Sphere::new(Vec3::new(1.5, 0.0, 0.0), 1.0);
        let ab = a.contact_sphere(&b).unwrap();
        let ba = b.contact_sphere(&a).unwrap();
        assert!(close(ab.normal, Vec3::NEG_X));
        assert!(close(ab.normal, -ba.normal));
        assert!((ab.depth - 0.5).abs() < 1e-5);
    }

    #[test]
    fn capsule_and_sphere() {
        let capsule = Capsule::new(Vec3::new(0.0, -2.0, 0.0), Vec3::new(0.0, 2.0, 0.0), 0.5);
        let sphere = Sphere::new(Vec3::new(0.0, 0.0, 0.9), 0.5);
        let contact = capsule.contact_sphere(&sphere).unwrap();
        assert!(close(contact.normal, Vec3::NEG_Z));
        assert!((contact.depth - 0.1).abs() < 1e-5);
    }

    #[test]
    fn segment_helpers() {
        assert_eq!(closest_on_segment(Vec3::ZERO, Vec3::X, Vec3::new(2.0, 1.0, 0.0)), Vec3::X);
        assert_eq!(closest_on_segment(Vec3::ZERO, Vec3::ZERO, Vec3::ONE), Vec3::ZERO);
        let (p, q) = closest_between_segments(Vec3::ZERO, Vec3::X, Vec3::new(0.5, 1.0, -1.0), Vec3::new(0.5, 1.0, 1.0));
        assert!(close(p, Vec3::new(0.5, 0.0, 0.0)));
        assert!(close(q, Vec3::new(0.5, 1.0, 0.0)));
    }

    #[test]
    fn collider_dispatch() {
        let collider = Collider::Sphere(Sphere::new(Vec3::new(0.0, 1.5, 0.0), 1.0));
        assert!(collider.contact_aabb(&unit_box()).is_some());
        assert!(collider.bounds().intersects(&unit_box()));
    }
}
