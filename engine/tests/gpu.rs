use engine::vulkan::MAX_FRAMES_IN_FLIGHT;
use engine::{AppWindow, Config, Engine, ErrorKind, Mesh, RenderError, Vertex};
use glam::Vec3;
use serial_test::serial;
use winit::event_loop::{EventLoop, EventLoopBuilder};

#[cfg(target_os = "linux")]
use winit::platform::x11::EventLoopBuilderExtX11;
#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;

fn event_loop() -> EventLoop<()> {
    EventLoopBuilder::new()
        .with_any_thread(true)
        .build()
        .expect("event loop")
}

fn triangle() -> [Vertex; 3] {
    let normal = Vec3::Z;
    let color = Vec3::ONE;
    [
        Vertex::new(Vec3::new(0.0, -0.5, 0.0), normal, color),
        Vertex::new(Vec3::new(0.5, 0.5, 0.0), normal, color),
        Vertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, color),
    ]
}

fn render(engine: &mut Engine, frames: usize) {
    for _ in 0..frames {
        engine.update().expect("frame");
    }
}

#[test]
#[ignore = "needs a Vulkan capable GPU and a display"]
#[serial]
fn test_renderer_lifecycle() {
    let _ = pretty_env_logger::try_init();

    let config = Config::default().with_validation(false).with_verbose(false);
    let window = AppWindow::with_event_loop(event_loop(), &config).expect("window");
    let quad = Mesh::quad();
    let mut engine = Engine::with_window(window, &config, quad.clone()).expect("engine");

    // Quad staged at init: 4 vertices of 36 bytes, 6 u32 indices.
    let vk = &engine.renderer().vk_renderer;
    let buffers = vk.mesh_buffers();
    assert_eq!(buffers.vertex.size, 144);
    assert_eq!(buffers.index.size, 24);
    assert_eq!(buffers.index_count, 6);
    assert_eq!(unsafe { vk.read_back_vertices() }.unwrap(), quad.vertex_bytes());
    assert_eq!(unsafe { vk.read_back_indices() }.unwrap(), quad.index_bytes());

    let bytes = (0..=255u8).collect::<Vec<_>>();
    assert_eq!(unsafe { vk.staging_round_trip(&bytes) }.unwrap(), bytes);
    assert!(unsafe { vk.staging_round_trip(&[]) }.unwrap().is_empty());

    assert_eq!(vk.framebuffer_count(), vk.swapchain_image_count());
    assert!(vk.swapchain_image_count() >= 2);

    render(&mut engine, 2 * MAX_FRAMES_IN_FLIGHT + 1);
    assert!(engine.renderer().frames().current_frame() < MAX_FRAMES_IN_FLIGHT);

    // A mesh of a different size is restaged once, before the next frame.
    let single = Mesh::from_triangles(&[triangle()]);
    engine.update_mesh(&single);
    assert!(engine.renderer().frames().is_mesh_stale());
    render(&mut engine, 1);
    assert!(!engine.renderer().frames().is_mesh_stale());

    let vk = &engine.renderer().vk_renderer;
    let buffers = vk.mesh_buffers();
    assert_eq!(buffers.index_count, 3);
    assert_eq!(buffers.vertex.size, 108);
    assert_eq!(buffers.index.size, 12);
    assert_eq!(unsafe { vk.read_back_indices() }.unwrap(), single.index_bytes());

    // Appending a triangle that shares no vertices grows both buffers.
    let mut moved = triangle();
    moved.iter_mut().for_each(|v| v.pos.z = 0.25);
    engine.add_triangle(moved);
    render(&mut engine, 1);
    assert_eq!(engine.renderer().vk_renderer.mesh_buffers().index_count, 6);

    // A mesh of the same size keeps both buffers and only replaces their contents.
    let red = |mut t: [Vertex; 3]| {
        t.iter_mut().for_each(|v| v.color = Vec3::X);
        t
    };
    let recolored = Mesh::from_triangles(&[red(triangle()), red(moved)]);
    let before = engine.renderer().vk_renderer.mesh_buffers();
    engine.update_mesh(&recolored);
    render(&mut engine, 1);

    let vk = &engine.renderer().vk_renderer;
    let after = vk.mesh_buffers();
    assert_eq!(after.vertex.buffer, before.vertex.buffer);
    assert_eq!(after.index.buffer, before.index.buffer);
    assert_eq!(unsafe { vk.read_back_vertices() }.unwrap(), recolored.vertex_bytes());
    assert_eq!(unsafe { vk.read_back_indices() }.unwrap(), recolored.index_bytes());

    // Rebuilding at an unchanged size yields the same swapchain shape.
    let images = engine.renderer().vk_renderer.swapchain_image_count();
    let extent = engine.renderer().vk_renderer.swapchain_extent();
    for _ in 0..2 {
        engine.recreate_swapchain().expect("recreate");
        let vk = &engine.renderer().vk_renderer;
        assert_eq!(vk.swapchain_image_count(), images);
        assert_eq!(vk.swapchain_extent(), extent);
        assert_eq!(vk.framebuffer_count(), images);
    }
    render(&mut engine, 2);

    engine.clean_up();
    engine.clean_up();

    // Nothing reaches the released device afterwards.
    let error = engine.update().unwrap_err();
    let kind = error.downcast_ref::<RenderError>().map(|e| e.kind);
    assert_eq!(kind, Some(ErrorKind::UpdateRender));
    assert!(engine.recreate_swapchain().is_err());
}
