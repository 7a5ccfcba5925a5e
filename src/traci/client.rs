// traci/client.rs
//
// Launches SUMO with a remote port and talks TraCI to it over TCP.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::control_system::phases::PhaseCode;
use crate::error::{Result, TlcsError};
use crate::simulation_engine::gateway::{Approach, LaneId, SimulatorGateway, VehicleId};
use crate::simulation_engine::route_generation::Scenario;
use crate::traci::codec::{
    frame_message, get_variable_command, read_get_response, set_int_command,
    simulation_step_command, encode_command, Reader, Status, TraciValue, CMD_CLOSE,
    CMD_GETVERSION, CMD_GET_EDGE_VARIABLE, CMD_GET_LANE_VARIABLE, CMD_GET_VEHICLE_VARIABLE,
    CMD_SET_TL_VARIABLE, CMD_SIMSTEP, ID_LIST, LAST_STEP_VEHICLE_HALTING_NUMBER,
    LAST_STEP_VEHICLE_NUMBER, TL_PHASE_INDEX, VAR_ACCUMULATED_WAITING_TIME,
};

const CONNECT_RETRIES: u32 = 60;
const CONNECT_DELAY: Duration = Duration::from_secs(1);

/// A TraCI session over any byte stream.
#[derive(Debug)]
pub struct TraciConnection<S = TcpStream> {
    stream: S,
}

impl TraciConnection<TcpStream> {
    /// Connects to a SUMO instance that may still be starting up.
    /// Gives up early once `child` has exited.
    pub fn connect(port: u16, mut child: Option<&mut Child>) -> Result<Self> {
        let mut last_err = None;
        for attempt in 1..=CONNECT_RETRIES {
            match TcpStream::connect(("127.0.0.1", port)) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!("Connected to TraCI port {} after {} attempt(s)", port, attempt);
                    return Ok(Self::new(stream));
                }
                Err(e) => {
                    last_err = Some(e);
                    if let Some(child) = child.as_deref_mut() {
                        if let Some(status) = child.try_wait()? {
                            return Err(TlcsError::Gateway(format!(
                                "SUMO exited with {} before accepting connections on port {}",
                                status, port
                            )));
                        }
                    }
                    thread::sleep(CONNECT_DELAY);
                }
            }
        }
        Err(TlcsError::Gateway(format!(
            "could not connect to SUMO on port {}: {}",
            port,
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }
}

impl<S: Read + Write> TraciConnection<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Sends one command and returns the reply body after its OK status.
    fn exchange(&mut self, command_id: u8, command: Vec<u8>) -> Result<Vec<u8>> {
        self.stream.write_all(&frame_message(&[command]))?;
        self.stream.flush()?;

        let mut length = [0u8; 4];
        self.stream.read_exact(&mut length)?;
        let total = i32::from_be_bytes(length);
        if total < 4 {
            return Err(TlcsError::Protocol(format!("bad message length {}", total)));
        }
        let mut body = vec![0u8; total as usize - 4];
        self.stream.read_exact(&mut body)?;

        let mut reader = Reader::new(&body);
        Status::read(&mut reader)?.check(command_id)?;
        let consumed = body.len() - reader.remaining();
        Ok(body.split_off(consumed))
    }

    /// API level and version string of the server.
    pub fn get_version(&mut self) -> Result<(i32, String)> {
        let rest = self.exchange(CMD_GETVERSION, encode_command(CMD_GETVERSION, &[]))?;
        let mut reader = Reader::new(&rest);
        let (response, _) = reader.read_command_header()?;
        if response != CMD_GETVERSION {
            return Err(TlcsError::Protocol(format!(
                "version response 0x{:02x}",
                response
            )));
        }
        Ok((reader.read_i32()?, reader.read_string()?))
    }

    pub fn simulation_step(&mut self) -> Result<()> {
        // The reply only carries subscription results, and nothing is subscribed.
        self.exchange(CMD_SIMSTEP, simulation_step_command(0.0))?;
        Ok(())
    }

    pub fn get(&mut self, domain: u8, variable: u8, object_id: &str) -> Result<TraciValue> {
        let rest = self.exchange(domain, get_variable_command(domain, variable, object_id))?;
        read_get_response(&mut Reader::new(&rest), domain, variable, object_id)
    }

    pub fn get_int(&mut self, domain: u8, variable: u8, object_id: &str) -> Result<i32> {
        match self.get(domain, variable, object_id)? {
            TraciValue::Integer(value) => Ok(value),
            other => Err(unexpected(other, "integer")),
        }
    }

    pub fn get_double(&mut self, domain: u8, variable: u8, object_id: &str) -> Result<f64> {
        match self.get(domain, variable, object_id)? {
            TraciValue::Double(value) => Ok(value),
            other => Err(unexpected(other, "double")),
        }
    }

    pub fn get_string_list(
        &mut self,
        domain: u8,
        variable: u8,
        object_id: &str,
    ) -> Result<Vec<String>> {
        match self.get(domain, variable, object_id)? {
            TraciValue::StringList(value) => Ok(value),
            other => Err(unexpected(other, "string list")),
        }
    }

    pub fn set_phase(&mut self, tl_id: &str, phase: PhaseCode) -> Result<()> {
        let command = set_int_command(CMD_SET_TL_VARIABLE, TL_PHASE_INDEX, tl_id, phase.0 as i32);
        self.exchange(CMD_SET_TL_VARIABLE, command)?;
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.exchange(CMD_CLOSE, encode_command(CMD_CLOSE, &[]))?;
        Ok(())
    }
}

fn unexpected(value: TraciValue, wanted: &str) -> TlcsError {
    TlcsError::Protocol(format!("expected {}, got {:?}", wanted, value))
}

fn non_negative(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| TlcsError::Protocol(format!("negative count {}", value)))
}

/// How to start SUMO for an episode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SumoLaunch {
    pub binary: PathBuf,
    pub sumocfg: PathBuf,
    pub max_steps: u32,
}

impl SumoLaunch {
    /// Resolves the binary under `home`: the resolved `SUMO_HOME`, or the error from resolving it.
    pub fn from_home<P: AsRef<Path>>(
        home: Result<PathBuf>,
        gui: bool,
        sumocfg: P,
        max_steps: u32,
    ) -> Result<Self> {
        Ok(Self::new(&home?, gui, sumocfg, max_steps))
    }

    pub fn new<P: AsRef<Path>>(sumo_home: &Path, gui: bool, sumocfg: P, max_steps: u32) -> Self {
        let name = if gui { "sumo-gui" } else { "sumo" };
        Self {
            binary: sumo_home.join("bin").join(name),
            sumocfg: sumocfg.as_ref().to_path_buf(),
            max_steps,
        }
    }

    pub fn args(&self, port: u16) -> Vec<String> {
        vec![
            "-c".to_string(),
            self.sumocfg.display().to_string(),
            "--no-step-log".to_string(),
            "true".to_string(),
            "--waiting-time-memory".to_string(),
            self.max_steps.to_string(),
            "--remote-port".to_string(),
            port.to_string(),
        ]
    }
}

/// Gateway backed by a real SUMO process, one process per session.
#[derive(Debug)]
pub struct SumoGateway {
    launch: SumoLaunch,
    connection: Option<TraciConnection>,
    child: Option<Child>,
}

impl SumoGateway {
    pub fn new(launch: SumoLaunch) -> Self {
        Self {
            launch,
            connection: None,
            child: None,
        }
    }

    fn connection(&mut self) -> Result<&mut TraciConnection> {
        self.connection
            .as_mut()
            .ok_or_else(|| TlcsError::Gateway("no active SUMO session".into()))
    }

    fn free_port() -> Result<u16> {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        Ok(listener.local_addr()?.port())
    }
}

impl SimulatorGateway for SumoGateway {
    fn start_session(&mut self, scenario: &Scenario) -> Result<()> {
        if self.connection.is_some() {
            return Err(TlcsError::Gateway("SUMO session already running".into()));
        }
        let port = Self::free_port()?;
        let child = Command::new(&self.launch.binary)
            .args(self.launch.args(port))
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| {
                TlcsError::Gateway(format!(
                    "failed to launch {}: {}",
                    self.launch.binary.display(),
                    e
                ))
            })?;
        self.child = Some(child);

        let mut connection = match TraciConnection::connect(port, self.child.as_mut()) {
            Ok(connection) => connection,
            Err(err) => {
                if let Some(mut child) = self.child.take() {
                    let _ = child.kill();
                    let _ = child.wait();
                }
                return Err(err);
            }
        };
        let (api, version) = connection.get_version()?;
        info!(
            "SUMO {} (TraCI API {}) running seed {} on port {}",
            version, api, scenario.seed, port
        );
        self.connection = Some(connection);
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        let mut connection = self
            .connection
            .take()
            .ok_or_else(|| TlcsError::Gateway("no active SUMO session".into()))?;
        let closed = connection.close();
        if let Some(mut child) = self.child.take() {
            child.wait()?;
        }
        closed
    }

    fn advance_one_step(&mut self) -> Result<()> {
        self.connection()?.simulation_step()
    }

    fn list_active_entities(&mut self) -> Result<Vec<VehicleId>> {
        self.connection()?
            .get_string_list(CMD_GET_VEHICLE_VARIABLE, ID_LIST, "")
    }

    fn get_accumulated_wait(&mut self, vehicle: &str) -> Result<f64> {
        self.connection()?
            .get_double(CMD_GET_VEHICLE_VARIABLE, VAR_ACCUMULATED_WAITING_TIME, vehicle)
    }

    fn get_halted_count(&mut self, approach: Approach) -> Result<u32> {
        let count = self.connection()?.get_int(
            CMD_GET_EDGE_VARIABLE,
            LAST_STEP_VEHICLE_HALTING_NUMBER,
            approach.edge_id(),
        )?;
        non_negative(count)
    }

    fn get_queue_depth(&mut self, lane: &LaneId) -> Result<u32> {
        let count = self.connection()?.get_int(
            CMD_GET_LANE_VARIABLE,
            LAST_STEP_VEHICLE_NUMBER,
            &lane.to_string(),
        )?;
        non_negative(count)
    }

    fn set_signal_phase(&mut self, intersection_id: &str, phase: PhaseCode) -> Result<()> {
        self.connection()?.set_phase(intersection_id, phase)
    }
}

impl Drop for SumoGateway {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            warn!("SUMO still running on drop, killing it");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
