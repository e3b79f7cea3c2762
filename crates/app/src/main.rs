//! Kiln - Main Entry Point
//!
//! Creates the window and renderer, loads the demo scene into the mesh
//! arena, and drives the frame loop from winit events.

use anyhow::Result;
use glam::{Vec2, Vec3, Vec4};
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use kiln_core::EngineConfig;
use kiln_platform::Window;
use kiln_renderer::{MeshData, Renderer, Vertex};

struct App {
    config: EngineConfig,
    window: Option<Window>,
    renderer: Option<Renderer>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            window: None,
            renderer: None,
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match Window::new(
            event_loop,
            self.config.width,
            self.config.height,
            &self.config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let mut renderer = match Renderer::new(&window, &self.config) {
            Ok(renderer) => renderer,
            Err(e) => {
                error!("Failed to create renderer: {:?}", e);
                event_loop.exit();
                return;
            }
        };

        // Demo scene: one mesh through the shared arena, one resident.
        if let Err(e) = renderer.add_arena_mesh(&demo_cube()) {
            // Out of arena space is recoverable: stop loading, keep running.
            warn!("Skipping demo cube: {:?}", e);
        }
        if let Err(e) = renderer.add_resident_mesh(&demo_triangle()) {
            warn!("Skipping demo triangle: {:?}", e);
        }

        info!(
            "Initialization complete ({} drawables), entering main loop",
            renderer.drawable_count()
        );
        self.renderer = Some(renderer);
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(ref mut window) = self.window {
                    window.resize(size.width, size.height);
                }
                if let Some(ref mut renderer) = self.renderer {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(ref mut renderer) = self.renderer
                    && let Err(e) = renderer.render_frame()
                {
                    // Recoverable conditions never reach this point; what
                    // does is a lost device or failed submit.
                    error!("Fatal render error: {:?}", e);
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

/// A unit cube around the origin, drawn as a single range.
fn demo_cube() -> MeshData {
    let positions = [
        // +Z face
        ([-0.5, -0.5, 0.5], [0.0, 0.0, 1.0]),
        ([0.5, -0.5, 0.5], [0.0, 0.0, 1.0]),
        ([0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
        ([-0.5, 0.5, 0.5], [0.0, 0.0, 1.0]),
        // -Z face
        ([0.5, -0.5, -0.5], [0.0, 0.0, -1.0]),
        ([-0.5, -0.5, -0.5], [0.0, 0.0, -1.0]),
        ([-0.5, 0.5, -0.5], [0.0, 0.0, -1.0]),
        ([0.5, 0.5, -0.5], [0.0, 0.0, -1.0]),
        // +X face
        ([0.5, -0.5, 0.5], [1.0, 0.0, 0.0]),
        ([0.5, -0.5, -0.5], [1.0, 0.0, 0.0]),
        ([0.5, 0.5, -0.5], [1.0, 0.0, 0.0]),
        ([0.5, 0.5, 0.5], [1.0, 0.0, 0.0]),
        // -X face
        ([-0.5, -0.5, -0.5], [-1.0, 0.0, 0.0]),
        ([-0.5, -0.5, 0.5], [-1.0, 0.0, 0.0]),
        ([-0.5, 0.5, 0.5], [-1.0, 0.0, 0.0]),
        ([-0.5, 0.5, -0.5], [-1.0, 0.0, 0.0]),
        // +Y face
        ([-0.5, 0.5, 0.5], [0.0, 1.0, 0.0]),
        ([0.5, 0.5, 0.5], [0.0, 1.0, 0.0]),
        ([0.5, 0.5, -0.5], [0.0, 1.0, 0.0]),
        ([-0.5, 0.5, -0.5], [0.0, 1.0, 0.0]),
        // -Y face
        ([-0.5, -0.5, -0.5], [0.0, -1.0, 0.0]),
        ([0.5, -0.5, -0.5], [0.0, -1.0, 0.0]),
        ([0.5, -0.5, 0.5], [0.0, -1.0, 0.0]),
        ([-0.5, -0.5, 0.5], [0.0, -1.0, 0.0]),
    ];

    let uvs = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

    let vertices = positions
        .iter()
        .enumerate()
        .map(|(i, (position, normal))| {
            Vertex::new(
                Vec3::from_array(*position),
                Vec3::from_array(*normal),
                Vec2::from_array(uvs[i % 4]),
                Vec4::new(1.0, 0.0, 0.0, 1.0),
            )
        })
        .collect();

    let indices = (0..6u32)
        .flat_map(|face| {
            let base = face * 4;
            [base, base + 1, base + 2, base + 2, base + 3, base]
        })
        .collect();

    MeshData {
        name: "demo_cube".to_string(),
        vertices,
        indices,
        ranges: Vec::new(),
    }
}

/// A single triangle in front of the camera.
fn demo_triangle() -> MeshData {
    let vertices = vec![
        Vertex::new(
            Vec3::new(0.0, 0.6, 0.0),
            Vec3::Z,
            Vec2::new(0.5, 0.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        ),
        Vertex::new(
            Vec3::new(-0.6, -0.6, 0.0),
            Vec3::Z,
            Vec2::new(0.0, 1.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        ),
        Vertex::new(
            Vec3::new(0.6, -0.6, 0.0),
            Vec3::Z,
            Vec2::new(1.0, 1.0),
            Vec4::new(1.0, 0.0, 0.0, 1.0),
        ),
    ];

    MeshData {
        name: "demo_triangle".to_string(),
        vertices,
        indices: vec![0, 1, 2],
        ranges: Vec::new(),
    }
}

fn main() -> Result<()> {
    kiln_core::init_logging();
    info!("Starting Kiln");

    let config = EngineConfig::load("kiln.toml")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_cube_shape() {
        let cube = demo_cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.indices.iter().all(|&i| i < 24));
    }

    #[test]
    fn test_demo_triangle_shape() {
        let triangle = demo_triangle();
        assert_eq!(triangle.vertices.len(), 3);
        assert_eq!(triangle.indices, vec![0, 1, 2]);
    }
}
