//! Viewer application: a ground plane, a textured character and six
//! orbiting point lights drawn as billboards.

use glam::{Mat4, Vec3, Vec4};
use tracing::{error, info, warn};
use winit::event::{DeviceEvent, DeviceId, ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use lumen_app::{AppContext, FrameClock, FrameRecorder, RenderApp};
use lumen_gpu::{
    vk, DescriptorLayout, DescriptorLayoutBuilder, DescriptorSet, GeometryBuffer, GpuContext, GraphicsDevice,
    GraphicsPipeline, GraphicsPipelineConfig, SampledResource, ShaderModule, ShaderStage, UniformResource,
};
use lumen_render::lights::ring_positions;
use lumen_render::{
    select_texture, BillboardVertex, Camera, CameraConfig, CameraSpace, DecodedImage, Illumination, MeshData,
    ModelSpace, SpotLight, Vertex, BILLBOARD_INDICES, BILLBOARD_VERTICES,
};

use crate::assets::{asset_path, load_images, load_meshes, shader_path};
use crate::controls::KeyTracker;

/// Descriptor bindings shared by the model and billboard shaders.
mod binding {
    pub const TEXTURE: u32 = 0;
    pub const CAMERA: u32 = 10;
    pub const ILLUMINATION: u32 = 11;
    pub const MODEL: u32 = 12;
    pub const LIGHT: u32 = 13;
}

/// Descriptor sets the scene allocates per frame, with headroom.
const EXPECTED_SETS: u32 = 100;

const PLANE_MODEL: &str = "models/pingmian.obj";
const PLANE_TEXTURE: &str = "images/pingmian.png";
const PLANE_SCALE: f32 = 3.0;

const CHARACTER_MODEL: &str = "models/xiaoluoli/xiaoluoli.obj";
const CHARACTER_TEXTURES: [&str; 4] = [
    "models/xiaoluoli/shenti.jpg",
    "models/xiaoluoli/tou.jpg",
    "models/xiaoluoli/toufa.jpg",
    "models/xiaoluoli/yifu.jpg",
];

const LIGHT_START: Vec3 = Vec3::splat(1.5);
const LIGHT_COLORS: [Vec4; 6] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 1.0),
    Vec4::new(0.0, 1.0, 1.0, 1.0),
    Vec4::new(1.0, 0.0, 1.0, 1.0),
    Vec4::new(1.0, 1.0, 0.0, 1.0),
];
const AMBIENT_INTENSITY: f32 = 0.001;
const AMBIENT_COLOR: Vec4 = Vec4::ONE;

/// A textured mesh with its own descriptor set.
struct Drawable {
    geometry: GeometryBuffer<Vertex>,
    texture: SampledResource,
    set: DescriptorSet,
}

impl Drawable {
    fn new(gpu: &GpuContext, layout: &DescriptorLayout, mesh: &MeshData, image: &DecodedImage) -> anyhow::Result<Self> {
        let geometry = GeometryBuffer::new(gpu, &mesh.vertices, &mesh.indices, &mesh.name)?;
        let texture = image.upload(gpu, layout.frame_count())?;
        let set = DescriptorSet::new(gpu, layout)?;
        texture.write_descriptor(gpu, &[&set], binding::TEXTURE)?;
        Ok(Self { geometry, texture, set })
    }

    fn destroy(&mut self, gpu: &GpuContext) -> anyhow::Result<()> {
        self.geometry.destroy(gpu)?;
        self.texture.destroy(gpu)?;
        Ok(())
    }
}

/// One point light and the billboard set that draws it.
struct LightBillboard {
    light: SpotLight,
    buffer: UniformResource,
    set: DescriptorSet,
}

/// Viewer application state.
pub struct Viewer {
    layout: DescriptorLayout,
    model_pipeline: GraphicsPipeline,
    billboard_pipeline: GraphicsPipeline,
    camera: Camera,
    camera_space: UniformResource,
    illumination: UniformResource,
    plane_space: UniformResource,
    character_space: UniformResource,
    plane: Drawable,
    character: Vec<Drawable>,
    billboard: GeometryBuffer<BillboardVertex>,
    lights: Vec<LightBillboard>,
    keys: KeyTracker,
    frame_time: f32,
}

impl RenderApp for Viewer {
    fn init(ctx: &mut AppContext) -> anyhow::Result<Self> {
        let device = &ctx.device;
        let gpu = &device.gpu;
        let frames = ctx.frame_count();

        let layout = scene_layout().build(gpu, frames)?;
        let model_pipeline = load_pipeline(device, &layout, "model", &Vertex::pipeline_config())?;
        let billboard_pipeline = load_pipeline(device, &layout, "billboard", &BillboardVertex::pipeline_config())?;
        info!("Pipelines created");

        let camera = Camera::new(&CameraConfig::default(), ctx.aspect_ratio());
        let camera_space = UniformResource::for_type::<CameraSpace>(gpu, true, frames, "camera_space")?;
        let illumination = UniformResource::for_type::<Illumination>(gpu, true, frames, "illumination")?;

        // Ground plane
        let plane_image = DecodedImage::open(asset_path(PLANE_TEXTURE))?;
        let plane_meshes = load_meshes(&asset_path(PLANE_MODEL))?;
        let plane_mesh = plane_meshes
            .first()
            .ok_or_else(|| anyhow::anyhow!("{PLANE_MODEL} contains no mesh"))?;
        let plane = Drawable::new(gpu, &layout, plane_mesh, &plane_image)?;
        let plane_space = UniformResource::for_type::<ModelSpace>(gpu, true, frames, "plane_space")?;
        let scale = ModelSpace::from(Mat4::from_scale(Vec3::splat(PLANE_SCALE)));
        plane_space.write_all(gpu, bytemuck::bytes_of(&scale))?;
        plane_space.write_descriptor(gpu, &[&plane.set], binding::MODEL)?;

        // Character, one drawable per part
        let candidates = load_images(&CHARACTER_TEXTURES)?;
        let character = load_meshes(&asset_path(CHARACTER_MODEL))?
            .iter()
            .map(|mesh| {
                let choice = select_texture(&mesh.name, &candidates, |c| c.name.as_str(), &plane_image);
                if choice.is_fallback() {
                    warn!("No texture named {:?}, using {}", mesh.name, PLANE_TEXTURE);
                }
                Drawable::new(gpu, &layout, mesh, choice.texture())
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        info!("Character loaded with {} parts", character.len());

        let character_space = UniformResource::for_type::<ModelSpace>(gpu, true, frames, "character_space")?;
        character_space.write_all(gpu, bytemuck::bytes_of(&ModelSpace::from(Mat4::IDENTITY)))?;
        let character_sets: Vec<&DescriptorSet> = character.iter().map(|part| &part.set).collect();
        character_space.write_descriptor(gpu, &character_sets, binding::MODEL)?;

        // Lights
        let billboard = GeometryBuffer::new(gpu, &BILLBOARD_VERTICES, &BILLBOARD_INDICES, "billboard")?;
        let lights = ring_positions(LIGHT_START, LIGHT_COLORS.len())
            .into_iter()
            .zip(LIGHT_COLORS)
            .enumerate()
            .map(|(i, (position, color))| -> anyhow::Result<LightBillboard> {
                let light = SpotLight::new(position, color, 1.0, 1.0);
                let buffer = UniformResource::for_type::<SpotLight>(gpu, true, frames, &format!("light[{i}]"))?;
                buffer.write_all(gpu, bytemuck::bytes_of(&light))?;
                let set = DescriptorSet::new(gpu, &layout)?;
                buffer.write_descriptor(gpu, &[&set], binding::LIGHT)?;
                Ok(LightBillboard { light, buffer, set })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        // Shared per-frame blocks
        let mut lit_sets = vec![&plane.set];
        lit_sets.extend(character_sets);
        illumination.write_descriptor(gpu, &lit_sets, binding::ILLUMINATION)?;
        lit_sets.extend(lights.iter().map(|light| &light.set));
        camera_space.write_descriptor(gpu, &lit_sets, binding::CAMERA)?;

        info!("Viewer initialized");

        Ok(Self {
            layout,
            model_pipeline,
            billboard_pipeline,
            camera,
            camera_space,
            illumination,
            plane_space,
            character_space,
            plane,
            character,
            billboard,
            lights,
            keys: KeyTracker::new(),
            frame_time: 0.0,
        })
    }

    fn update(&mut self, _ctx: &AppContext, clock: &FrameClock) {
        self.frame_time = clock.frame_time();
        self.camera.advance(self.keys.movement(), self.frame_time);
    }

    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    fn draw(&mut self, ctx: &AppContext, frame: &mut FrameRecorder<'_>) -> anyhow::Result<()> {
        let gpu = &ctx.device.gpu;
        let frame_index = frame.frame_index();

        self.camera_space
            .write(gpu, frame_index, &self.camera.camera_space())?;
        let lights: Vec<SpotLight> = self.lights.iter().map(|l| l.light).collect();
        let illumination = Illumination::new(AMBIENT_INTENSITY, AMBIENT_COLOR, &lights);
        self.illumination.write(gpu, frame_index, &illumination)?;

        frame.draw(&self.plane.geometry, &self.plane.set, &self.model_pipeline)?;
        for part in &self.character {
            frame.draw(&part.geometry, &part.set, &self.model_pipeline)?;
        }
        for light in &self.lights {
            frame.draw(&self.billboard, &light.set, &self.billboard_pipeline)?;
        }

        // Orbit by one radian per second. The upload blocks until it has
        // landed, so this frame's billboards already use the new positions.
        for light in &mut self.lights {
            light.light.rotate_about_z(self.frame_time);
            light.buffer.write(gpu, frame_index, &light.light)?;
        }

        Ok(())
    }

    fn on_event(&mut self, ctx: &mut AppContext, event: &WindowEvent) -> bool {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return false;
        };

        if event.state == ElementState::Pressed && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
            info!("Escape pressed");
            ctx.exit();
            return true;
        }
        self.keys.process_key_event(event);
        true
    }

    fn on_device_event(&mut self, _device_id: DeviceId, event: &DeviceEvent) {
        if let DeviceEvent::MouseMotion { delta: (dx, dy) } = *event {
            self.camera.rotate(dx as f32, dy as f32);
        }
    }

    fn cleanup(&mut self, ctx: &mut AppContext) {
        let gpu = &ctx.device.gpu;
        if let Err(e) = self.release(gpu) {
            error!("Failed to release scene resources: {e:#}");
        }
    }
}

impl Viewer {
    fn release(&mut self, gpu: &GpuContext) -> anyhow::Result<()> {
        let device = gpu.device();
        // SAFETY: the device is idle during cleanup
        unsafe {
            self.model_pipeline.destroy(device);
            self.billboard_pipeline.destroy(device);
        }

        self.plane.destroy(gpu)?;
        for part in &mut self.character {
            part.destroy(gpu)?;
        }
        self.billboard.destroy(gpu)?;
        for light in &mut self.lights {
            light.buffer.destroy(gpu)?;
        }
        self.camera_space.destroy(gpu)?;
        self.illumination.destroy(gpu)?;
        self.plane_space.destroy(gpu)?;
        self.character_space.destroy(gpu)?;

        // SAFETY: every pipeline and set built from the layout is gone or idle
        unsafe { self.layout.destroy(device) };
        Ok(())
    }
}

fn scene_layout() -> DescriptorLayoutBuilder {
    let vertex_fragment = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
    DescriptorLayoutBuilder::new()
        .uniform_buffer(binding::CAMERA, vertex_fragment)
        .uniform_buffer(binding::ILLUMINATION, vk::ShaderStageFlags::FRAGMENT)
        .uniform_buffer(binding::MODEL, vk::ShaderStageFlags::VERTEX)
        .uniform_buffer(binding::LIGHT, vertex_fragment)
        .combined_image_sampler(binding::TEXTURE, vk::ShaderStageFlags::FRAGMENT)
        .expected_sets(EXPECTED_SETS)
}

/// Build a pipeline from `assets/shaders/<name>.{vert,frag}.spv`.
fn load_pipeline(
    device: &GraphicsDevice,
    layout: &DescriptorLayout,
    name: &str,
    config: &GraphicsPipelineConfig,
) -> anyhow::Result<GraphicsPipeline> {
    let vk_device = device.gpu.device();
    let vertex = ShaderModule::from_file(vk_device, shader_path(&format!("{name}.vert")), ShaderStage::Vertex)?;
    let fragment = match ShaderModule::from_file(vk_device, shader_path(&format!("{name}.frag")), ShaderStage::Fragment) {
        Ok(fragment) => fragment,
        Err(e) => {
            // SAFETY: the module was never used in a pipeline
            unsafe { vertex.destroy(vk_device) };
            return Err(e.into());
        }
    };

    let pipeline = GraphicsPipeline::new(device, layout, &vertex, &fragment, config);
    // SAFETY: modules are only needed while the pipeline is created
    unsafe {
        vertex.destroy(vk_device);
        fragment.destroy(vk_device);
    }
    Ok(pipeline?)
}
