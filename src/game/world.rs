//! Rigid-body world: arena statics, the ball, and kinematic player bodies.
//!
//! The simulation only leans on the physics engine for ball integration and
//! ball-vs-geometry response. Player motion is kinematic and the player-ball
//! contact model is layered on top after each step; the boundary enforcer is
//! the safety net for anything the engine lets slip.

use rapier3d::prelude::*;

use super::tuning::{
    BALL_ANGULAR_DAMPING, BALL_LINEAR_DAMPING, BALL_MASS, BALL_RADIUS, BALL_RESTITUTION,
    BALL_SPAWN, GOAL_RESTITUTION, GRAVITY, GROUND_RESTITUTION, PLAYER_RADIUS, WALL_RESTITUTION,
};
use crate::util::time::SIMULATION_TPS;

/// Match-private physics world
pub struct ArenaWorld {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    params: IntegrationParameters,
    gravity: Vector<Real>,
}

impl ArenaWorld {
    pub fn new() -> Self {
        let mut params = IntegrationParameters::default();
        params.dt = 1.0 / SIMULATION_TPS as f32;

        let mut world = Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            params,
            gravity: vector![0.0, -GRAVITY, 0.0],
        };
        world.build_arena();
        world
    }

    /// Static arena geometry. Units are meters; the pitch runs along x with
    /// a goal at each end.
    fn build_arena(&mut self) {
        // Ground: 30 x 0.5 x 20 slab, top face at y = 0
        self.insert_static(
            ColliderBuilder::cuboid(15.0, 0.25, 10.0)
                .translation(vector![0.0, -0.25, 0.0])
                .friction(0.7)
                .restitution(GROUND_RESTITUTION),
        );

        // Back walls along z
        for z in [-11.0, 11.0] {
            self.insert_static(
                ColliderBuilder::cuboid(15.0, 5.0, 0.5)
                    .translation(vector![0.0, 5.0, z])
                    .restitution(WALL_RESTITUTION),
            );
        }

        // Side-wall segments flanking the goal openings
        for x in [-16.0, 16.0] {
            for z in [-6.5, 6.5] {
                self.insert_static(
                    ColliderBuilder::cuboid(0.5, 5.0, 1.75)
                        .translation(vector![x, 5.0, z])
                        .restitution(WALL_RESTITUTION),
                );
            }
        }

        // Goal back walls
        for x in [-17.2, 17.2] {
            self.insert_static(
                ColliderBuilder::cuboid(0.2, 5.0, 3.0)
                    .translation(vector![x, 5.0, 0.0])
                    .restitution(GOAL_RESTITUTION),
            );
        }

        // Goal posts (vertical cylinders)
        for x in [-10.8, 10.8] {
            for z in [-2.5, 2.5] {
                self.insert_static(
                    ColliderBuilder::cylinder(2.0, 0.1)
                        .translation(vector![x, 2.0, z])
                        .restitution(0.5),
                );
            }
        }

        // Crossbars (cylinders laid along z at the top of each mouth)
        for x in [-10.8, 10.8] {
            self.insert_static(
                ColliderBuilder::cylinder(2.5, 0.1)
                    .translation(vector![x, 4.0, 0.0])
                    .rotation(vector![std::f32::consts::FRAC_PI_2, 0.0, 0.0])
                    .restitution(0.5),
            );
        }

        // Goal net side walls sealing the net interior
        for x in [-14.0, 14.0] {
            for z in [-2.5, 2.5] {
                self.insert_static(
                    ColliderBuilder::cuboid(3.2, 2.0, 0.1)
                        .translation(vector![x, 2.0, z])
                        .restitution(WALL_RESTITUTION),
                );
            }
        }

        // Ceiling
        self.insert_static(
            ColliderBuilder::cuboid(15.0, 0.25, 10.0)
                .translation(vector![0.0, 10.25, 0.0])
                .restitution(0.1),
        );
    }

    fn insert_static(&mut self, builder: ColliderBuilder) {
        self.colliders.insert(builder.build());
    }

    /// Create the dynamic ball body. CCD is enabled so fast shots do not
    /// tunnel through the walls.
    pub fn spawn_ball(&mut self) -> RigidBodyHandle {
        let body = RigidBodyBuilder::dynamic()
            .translation(vector![BALL_SPAWN[0], BALL_SPAWN[1], BALL_SPAWN[2]])
            .linear_damping(BALL_LINEAR_DAMPING)
            .angular_damping(BALL_ANGULAR_DAMPING)
            .ccd_enabled(true)
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(BALL_RADIUS)
            .restitution(BALL_RESTITUTION)
            .friction(0.4)
            .mass(BALL_MASS)
            .build();
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        handle
    }

    /// Create a kinematic player body with its contact sphere
    pub fn spawn_player(&mut self, pos: [f32; 3]) -> (RigidBodyHandle, ColliderHandle) {
        let body = RigidBodyBuilder::kinematic_position_based()
            .translation(vector![pos[0], pos[1], pos[2]])
            .build();
        let handle = self.bodies.insert(body);
        let collider = ColliderBuilder::ball(PLAYER_RADIUS).friction(0.5).build();
        let col_handle = self
            .colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        (handle, col_handle)
    }

    /// Replace a player's contact sphere (giant effect). The new sphere is
    /// lifted so its underside stays level with the normal one.
    pub fn swap_player_collider(
        &mut self,
        body: RigidBodyHandle,
        old: ColliderHandle,
        radius: f32,
    ) -> ColliderHandle {
        self.colliders.remove(old, &mut self.islands, &mut self.bodies, true);
        let collider = ColliderBuilder::ball(radius)
            .translation(vector![0.0, (radius - PLAYER_RADIUS).max(0.0), 0.0])
            .friction(0.5)
            .build();
        self.colliders
            .insert_with_parent(collider, body, &mut self.bodies)
    }

    /// Release a body and everything attached to it
    pub fn remove_body(&mut self, handle: RigidBodyHandle) {
        self.bodies.remove(
            handle,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Advance the world by exactly one fixed timestep
    pub fn step(&mut self) {
        self.pipeline.step(
            &self.gravity,
            &self.params,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    pub fn translation(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|b| *b.translation())
    }

    pub fn set_translation(&mut self, handle: RigidBodyHandle, pos: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(pos, true);
        }
    }

    pub fn linvel(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|b| *b.linvel())
    }

    pub fn set_linvel(&mut self, handle: RigidBodyHandle, vel: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_linvel(vel, true);
        }
    }

    pub fn angvel(&self, handle: RigidBodyHandle) -> Option<Vector<Real>> {
        self.bodies.get(handle).map(|b| *b.angvel())
    }

    pub fn set_angvel(&mut self, handle: RigidBodyHandle, vel: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_angvel(vel, true);
        }
    }

    pub fn rotation(&self, handle: RigidBodyHandle) -> Option<[f32; 4]> {
        self.bodies.get(handle).map(|b| {
            let q = b.rotation().quaternion();
            [q.i, q.j, q.k, q.w]
        })
    }

    pub fn apply_impulse(&mut self, handle: RigidBodyHandle, impulse: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.apply_impulse(impulse, true);
        }
    }

    /// Queue a kinematic body's pose for the next step
    pub fn set_next_kinematic_translation(&mut self, handle: RigidBodyHandle, pos: Vector<Real>) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_next_kinematic_translation(pos);
        }
    }

    /// Hard ball reset after goals: pose, spin and velocity all zeroed
    pub fn reset_ball(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.bodies.get_mut(handle) {
            body.set_translation(vector![BALL_SPAWN[0], BALL_SPAWN[1], BALL_SPAWN[2]], true);
            body.set_linvel(vector![0.0, 0.0, 0.0], true);
            body.set_angvel(vector![0.0, 0.0, 0.0], true);
            body.set_rotation(Rotation::identity(), true);
        }
    }
}

impl Default for ArenaWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ball_spawns_at_center_and_falls() {
        let mut world = ArenaWorld::new();
        let ball = world.spawn_ball();

        let start = world.translation(ball).unwrap();
        assert_eq!(start.x, 0.0);
        assert_eq!(start.y, 2.0);

        for _ in 0..30 {
            world.step();
        }
        let after = world.translation(ball).unwrap();
        assert!(after.y < start.y, "gravity should pull the ball down");
    }

    #[test]
    fn ball_comes_to_rest_above_ground() {
        let mut world = ArenaWorld::new();
        let ball = world.spawn_ball();
        for _ in 0..600 {
            world.step();
        }
        let pos = world.translation(ball).unwrap();
        // Top of the ground slab is y = 0; the ball center settles near R_b
        assert!(pos.y > 0.0 && pos.y < 2.0, "ball at y = {}", pos.y);
        assert!(pos.x.abs() < 1.0); // dropped straight down, stays near center
    }

    #[test]
    fn kinematic_player_follows_queued_translation() {
        let mut world = ArenaWorld::new();
        let (body, _col) = world.spawn_player([-6.0, 0.1, 0.0]);
        world.set_next_kinematic_translation(body, vector![-5.9, 0.1, 0.0]);
        world.step();
        let pos = world.translation(body).unwrap();
        assert!((pos.x - -5.9).abs() < 1e-4);
    }

    #[test]
    fn impulse_moves_ball() {
        let mut world = ArenaWorld::new();
        let ball = world.spawn_ball();
        world.apply_impulse(ball, vector![10.0, 0.0, 0.0]);
        world.step();
        let vel = world.linvel(ball).unwrap();
        assert!(vel.x > 5.0, "impulse should accelerate unit-mass ball");
    }
}
