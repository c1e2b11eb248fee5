//! Upload/readback checks against a real device.

use ash::vk;
use gpu_allocator::MemoryLocation;
use lumen_gpu::{
    mip_level_count, DescriptorLayoutBuilder, DescriptorSet, GpuError, SampledResource, TransferBuffer,
    TransferImage, UniformResource,
};
use lumen_render::{CameraSpace, DecodedImage};

use crate::harness::{HeadlessDevice, TEST_FRAME_COUNT};

fn solid_round_trip(width: u32, height: u32, rgba: [u8; 4]) {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let source = DecodedImage::solid("solid", width, height, rgba);

    let mut image = TransferImage::with_pixels(gpu, width, height, &source.pixels, "solid").unwrap();
    let readback = image.read_pixels(gpu).unwrap();
    device
        .expect_pixels("solid", width, height, &readback, &source.pixels, 0.0)
        .unwrap();
    image.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn solid_texture_round_trips_square() {
    solid_round_trip(256, 256, [255, 0, 0, 255]);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn solid_texture_round_trips_odd_extent() {
    solid_round_trip(257, 129, [12, 200, 77, 128]);
}

#[test]
#[ignore = "Requires GPU hardware"]
fn odd_extent_gets_full_mip_chain() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let mut image = TransferImage::new(gpu, 257, 129, "mips").unwrap();
    assert_eq!(image.mip_levels(), 9);
    assert_eq!(image.mip_levels(), mip_level_count(257, 129));
    image.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn image_to_image_copy_replaces_contents() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let red = DecodedImage::solid("red", 64, 32, [255, 0, 0, 255]);
    let blue = DecodedImage::solid("blue", 64, 32, [0, 0, 255, 255]);

    let mut source = TransferImage::with_pixels(gpu, 64, 32, &red.pixels, "source").unwrap();
    let mut target = TransferImage::with_pixels(gpu, 64, 32, &blue.pixels, "target").unwrap();
    target.write_image(gpu, &source).unwrap();

    assert_eq!(target.read_pixels(gpu).unwrap(), red.pixels);
    // The source is still readable afterwards.
    assert_eq!(source.read_pixels(gpu).unwrap(), red.pixels);

    source.destroy(gpu).unwrap();
    target.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn image_copy_requires_equal_extents() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let mut small = TransferImage::new(gpu, 16, 16, "small").unwrap();
    let mut large = TransferImage::new(gpu, 32, 32, "large").unwrap();
    assert!(large.write_image(gpu, &small).is_err());
    small.destroy(gpu).unwrap();
    large.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn staging_buffer_uploads_into_image() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let pixels = DecodedImage::solid("green", 8, 8, [0, 255, 0, 255]).pixels;

    let mut staging = gpu
        .create_buffer(
            pixels.len() as u64,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "staging",
        )
        .unwrap();
    staging.write_bytes(&pixels).unwrap();

    let mut image = TransferImage::new(gpu, 8, 8, "from_buffer").unwrap();
    image.write_buffer(gpu, &staging).unwrap();
    assert_eq!(image.read_pixels(gpu).unwrap(), pixels);

    image.destroy(gpu).unwrap();
    gpu.free_buffer(&mut staging).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn buffer_round_trip() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let data: Vec<u8> = (0..=255).collect();

    let mut buffer =
        TransferBuffer::with_data(gpu, &data, vk::BufferUsageFlags::STORAGE_BUFFER, "bytes").unwrap();
    assert_eq!(buffer.read_data(gpu).unwrap(), data);

    buffer.write_data(gpu, &[7; 16]).unwrap();
    let readback = buffer.read_data(gpu).unwrap();
    assert_eq!(&readback[..16], &[7; 16]);
    assert_eq!(&readback[16..], &data[16..]);

    assert!(buffer.write_data(gpu, &[0; 512]).is_err());
    buffer.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn per_frame_uniform_writes_touch_one_slot() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let size = std::mem::size_of::<CameraSpace>();

    let layout = DescriptorLayoutBuilder::new()
        .uniform_buffer(10, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .build(gpu, TEST_FRAME_COUNT)
        .unwrap();
    let set = DescriptorSet::new(gpu, &layout).unwrap();

    let mut camera =
        UniformResource::for_type::<CameraSpace>(gpu, true, TEST_FRAME_COUNT, "camera_space").unwrap();
    camera.write_all(gpu, &vec![0; size]).unwrap();
    let bound = camera.write_descriptor(gpu, &[&set], 10).unwrap();

    // Each frame's set points at that frame's own buffer.
    let own: Vec<(vk::DescriptorSet, vk::Buffer)> = (0..TEST_FRAME_COUNT)
        .map(|frame| (set.get(frame).unwrap(), camera.buffer(frame).unwrap().handle()))
        .collect();
    assert_eq!(bound, own);
    assert_ne!(bound[0].1, bound[1].1);
    assert_ne!(bound[1].1, bound[2].1);

    let ones: Vec<f32> = vec![1.0; size / 4];
    camera.write_data(gpu, 1, bytemuck::cast_slice(&ones)).unwrap();

    for frame in 0..TEST_FRAME_COUNT {
        let bytes = camera.buffer(frame).unwrap().read_data(gpu).unwrap();
        let floats: &[f32] = bytemuck::cast_slice(&bytes);
        let expected = if frame == 1 { 1.0 } else { 0.0 };
        assert!(floats.iter().all(|&f| (f - expected).abs() < f32::EPSILON), "frame {frame}");
    }
    // Writing data never moves a binding.
    assert_eq!(camera.write_descriptor(gpu, &[&set], 10).unwrap(), own);

    assert!(matches!(
        camera.write_data(gpu, TEST_FRAME_COUNT, &[0; 4]),
        Err(GpuError::FrameIndexOutOfRange { .. })
    ));

    gpu.wait_idle().unwrap();
    camera.destroy(gpu).unwrap();
    // SAFETY: nothing built from the layout is in use
    unsafe { layout.destroy(gpu.device()) };
}

#[test]
#[ignore = "Requires GPU hardware"]
fn shared_uniform_is_visible_from_every_frame() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let mut shared = UniformResource::new(gpu, 16, false, TEST_FRAME_COUNT, "shared").unwrap();
    shared.write_data(gpu, 2, &[9; 16]).unwrap();

    for frame in 0..TEST_FRAME_COUNT {
        assert_eq!(shared.buffer(frame).unwrap().read_data(gpu).unwrap(), vec![9; 16]);
    }
    shared.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn descriptor_writes_are_idempotent() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let layout = DescriptorLayoutBuilder::new()
        .uniform_buffer(10, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
        .combined_image_sampler(0, vk::ShaderStageFlags::FRAGMENT)
        .expected_sets(2)
        .build(gpu, TEST_FRAME_COUNT)
        .unwrap();
    let set = DescriptorSet::new(gpu, &layout).unwrap();
    assert_eq!(set.frame_count(), TEST_FRAME_COUNT);

    let mut camera =
        UniformResource::for_type::<CameraSpace>(gpu, true, TEST_FRAME_COUNT, "camera_space").unwrap();
    let texture = DecodedImage::solid("white", 4, 4, [255; 4]);
    let mut sampled = texture.upload(gpu, TEST_FRAME_COUNT).unwrap();

    let handles = set.handles().to_vec();
    let first_uniform = camera.write_descriptor(gpu, &[&set], 10).unwrap();
    let first_texture = sampled.write_descriptor(gpu, &[&set], 0).unwrap();

    assert_eq!(camera.write_descriptor(gpu, &[&set], 10).unwrap(), first_uniform);
    assert_eq!(sampled.write_descriptor(gpu, &[&set], 0).unwrap(), first_texture);
    assert_eq!(set.handles(), handles.as_slice());

    // A shared texture binds the same view into every frame.
    assert!(first_texture.iter().all(|&(_, view)| view == first_texture[0].1));

    gpu.wait_idle().unwrap();
    camera.destroy(gpu).unwrap();
    sampled.destroy(gpu).unwrap();
    // SAFETY: nothing built from the layout is in use
    unsafe { layout.destroy(gpu.device()) };
}

#[test]
#[ignore = "Requires GPU hardware"]
fn descriptor_pool_exhaustion_is_reported() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let layout = DescriptorLayoutBuilder::new()
        .uniform_buffer(10, vk::ShaderStageFlags::VERTEX)
        .expected_sets(1)
        .build(gpu, TEST_FRAME_COUNT)
        .unwrap();

    let _first = DescriptorSet::new(gpu, &layout).unwrap();
    assert!(matches!(
        DescriptorSet::new(gpu, &layout),
        Err(GpuError::DescriptorAllocation(_))
    ));
    // SAFETY: nothing built from the layout is in use
    unsafe { layout.destroy(gpu.device()) };
}

#[test]
#[ignore = "Requires GPU hardware"]
fn per_frame_texture_slots_are_independent() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let black = DecodedImage::solid("black", 4, 4, [0, 0, 0, 255]).pixels;
    let white = DecodedImage::solid("white", 4, 4, [255; 4]).pixels;

    let mut texture = SampledResource::new(gpu, 4, 4, true, TEST_FRAME_COUNT, "per_frame").unwrap();
    texture.write_all(gpu, &black).unwrap();
    texture.write_data(gpu, 0, &white).unwrap();

    assert_eq!(texture.image(0).unwrap().read_pixels(gpu).unwrap(), white);
    assert_eq!(texture.image(2).unwrap().read_pixels(gpu).unwrap(), black);
    texture.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn unsupported_transition_is_rejected() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let mut image = TransferImage::new(gpu, 4, 4, "transition").unwrap();

    let result = gpu.transition_image_layout(
        image.handle(),
        image.mip_levels(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::PRESENT_SRC_KHR,
    );
    assert!(matches!(
        result,
        Err(GpuError::UnsupportedLayoutTransition { .. })
    ));
    image.destroy(gpu).unwrap();
}

#[test]
#[ignore = "Requires GPU hardware"]
fn empty_resources_are_rejected() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();

    assert!(matches!(
        TransferBuffer::new(gpu, 0, vk::BufferUsageFlags::UNIFORM_BUFFER, "empty"),
        Err(GpuError::InvalidState(_))
    ));
    assert!(matches!(
        TransferImage::new(gpu, 0, 8, "flat"),
        Err(GpuError::InvalidState(_))
    ));
}

#[test]
#[ignore = "Requires GPU hardware"]
fn image_copy_onto_itself_is_rejected() {
    let device = HeadlessDevice::new().unwrap();
    let gpu = device.gpu();
    let pixels = DecodedImage::solid("green", 8, 8, [0, 255, 0, 255]).pixels;
    let mut image = TransferImage::with_pixels(gpu, 8, 8, &pixels, "self").unwrap();

    assert!(matches!(
        image.write_image(gpu, &image),
        Err(GpuError::InvalidState(_))
    ));
    assert_eq!(image.read_pixels(gpu).unwrap(), pixels);
    image.destroy(gpu).unwrap();
}

