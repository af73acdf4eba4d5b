use std::{env, fmt::Debug, fs, process::ExitCode};

use rand::Rng;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use tensorexec::{
    AllocationSpec, DataType, DeviceProvider, ExecutionReport, Executor, ExecutorConfig,
    HostDevice, HostDeviceConfig, Kernel, OutputTarget, Placement, ProgramBuilder, TensorDesc,
    VulkanDevice, utils::format::format_memory_mb,
};

const USAGE: &str = "usage: tensorexec [--verify] [--vulkan <gpu index>] [program.bin]";

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut verify = false;
    let mut vulkan = None;
    let mut path = None;
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--verify" => verify = true,
            "--vulkan" => match args.next().and_then(|index| index.parse::<usize>().ok()) {
                Some(index) => vulkan = Some(index),
                None => {
                    eprintln!("{}", USAGE);
                    return ExitCode::FAILURE;
                }
            },
            "-h" | "--help" => {
                println!("{}", USAGE);
                return ExitCode::SUCCESS;
            }
            _ if path.is_none() => path = Some(arg),
            _ => {
                eprintln!("{}", USAGE);
                return ExitCode::FAILURE;
            }
        }
    }

    let config = ExecutorConfig::default().with_verify_before_execute(verify);

    if let Some(index) = vulkan {
        match VulkanDevice::new(index) {
            Ok(device) => {
                let mut executor = Executor::new(device, config);
                return run(&mut executor, path.as_deref(), VulkanDevice::outstanding_handles);
            }
            Err(e) => warn!("Vulkan GPU {} unavailable, using the host device: {}", index, e),
        }
    }

    let device = HostDevice::new(HostDeviceConfig::default());
    info!(
        "Host device ready, {} device memory available",
        format_memory_mb(device.device_memory_available())
    );
    let mut executor = Executor::new(device, config);
    run(&mut executor, path.as_deref(), HostDevice::outstanding_handles)
}

fn run<P>(
    executor: &mut Executor<P>,
    path: Option<&str>,
    outstanding_handles: fn(&P) -> usize,
) -> ExitCode
where
    P: DeviceProvider,
    P::Handle: Debug,
{
    let report = match path {
        Some(path) => match fs::read(path) {
            Ok(bytes) => executor.execute(&bytes),
            Err(e) => {
                error!("Failed to read {}: {}", path, e);
                return ExitCode::FAILURE;
            }
        },
        None => match run_demo(executor) {
            Ok(report) => report,
            Err(e) => {
                error!("Demo setup failed: {}", e);
                return ExitCode::FAILURE;
            }
        },
    };

    println!("{}", report);
    print_outputs(executor.provider(), &report);

    let outstanding = outstanding_handles(executor.provider());
    if outstanding != report.outputs.len() {
        error!(
            "{} handles outstanding after teardown",
            outstanding.saturating_sub(report.outputs.len())
        );
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// relu(x * w) over random data, with the result read back to the host.
fn run_demo<P: DeviceProvider>(
    executor: &mut Executor<P>,
) -> Result<ExecutionReport<P::Handle>, Box<dyn std::error::Error>> {
    let desc = TensorDesc::new(vec![2, 4], DataType::F32);
    let program = ProgramBuilder::new()
        .input(1, desc.clone())
        .input(2, desc.clone())
        .allocate(7, desc.clone(), Placement::Device)
        .to_device(1, OutputTarget::InPlace)
        .to_device(2, OutputTarget::New(3))
        .compute(Kernel::Multiply, &[1, 3], 4)
        .compute(Kernel::Relu, &[4], 5)
        .from_device(5, OutputTarget::New(6))
        .deallocate(4, false)
        .deallocate(7, false)
        .output(6)
        .build();

    let elements = desc.num_elements().ok_or("demo tensor too large")?;
    let mut rng = rand::rng();
    let mut random_tensor = |device: &mut P| {
        let data: Vec<u8> = (0..elements)
            .flat_map(|_| rng.random_range(-1.0f32..1.0).to_le_bytes())
            .collect();
        device.allocate(&AllocationSpec::new(&desc, Placement::Host).with_data(&data))
    };
    let x = random_tensor(executor.provider_mut())?;
    let w = random_tensor(executor.provider_mut())?;

    let bytes = program.encode()?;
    info!("Demo program encoded to {} bytes", bytes.len());
    Ok(executor.execute_with_inputs(&bytes, vec![(1, x), (2, w)]))
}

fn print_outputs<P>(device: &P, report: &ExecutionReport<P::Handle>)
where
    P: DeviceProvider,
    P::Handle: Debug,
{
    for (id, tensor) in &report.outputs {
        match device.read_host(tensor) {
            Ok(bytes) => {
                let values: Vec<f32> = bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                    .collect();
                println!("output {} {:?}: {:?}", id, tensor, values);
            }
            Err(e) => println!("output {} {:?}: {}", id, tensor, e),
        }
    }
}
