use cgmath::{vec3, Point3, Quaternion, Vector3};
use rapier3d::na::UnitQuaternion;
use rapier3d::prelude::*;

pub fn to_nvec(vec: Vector3<f32>) -> Vector<Real> {
    vector![vec.x, vec.y, vec.z]
}

pub fn to_npoint(point: Point3<f32>) -> Vector<Real> {
    vector![point.x, point.y, point.z]
}

pub fn to_cgvec(vec: Vector<Real>) -> Vector3<f32> {
    Vector3 {
        x: vec.x,
        y: vec.y,
        z: vec.z,
    }
}

pub fn to_cgpoint(vec: Vector<Real>) -> Point3<f32> {
    Point3 {
        x: vec.x,
        y: vec.y,
        z: vec.z,
    }
}

pub fn to_nquat(quat: Quaternion<f32>) -> UnitQuaternion<f32> {
    let nquat = rapier3d::na::geometry::Quaternion::new(quat.s, quat.v.x, quat.v.y, quat.v.z);
    UnitQuaternion::from_quaternion(nquat)
}

pub fn to_cgquat(quat: UnitQuaternion<f32>) -> Quaternion<f32> {
    Quaternion {
        v: vec3(quat.i, quat.j, quat.k),
        s: quat.w,
    }
}
