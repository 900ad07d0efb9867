//! CSV trace of plant temperatures.

use std::io::Write;

use crate::rig::ThermalRig;

pub struct TraceRecorder<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TraceRecorder<W> {
    pub fn new(inner: W) -> csv::Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(["time", "name", "kind", "temperature", "setpoint"])?;
        Ok(Self { writer })
    }

    /// One row per plant at logical time `time`.
    pub fn record(&mut self, time: f64, rig: &ThermalRig) -> csv::Result<()> {
        for heater in rig.heaters() {
            self.writer.write_record([
                format!("{:.3}", time),
                heater.name.clone(),
                "heater".to_string(),
                format!("{:.2}", heater.temperature),
                format!("{:.2}", heater.setpoint),
            ])?;
        }
        for sensor in rig.sensors() {
            self.writer.write_record([
                format!("{:.3}", time),
                sensor.name.clone(),
                "sensor".to_string(),
                format!("{:.2}", sensor.measured),
                String::new(),
            ])?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plant::HeaterPlantConfig;
    use crate::rig::RigConfig;

    #[test]
    fn writes_header_and_rows() {
        let mut config = RigConfig::default();
        config.heaters.insert("heater_bed".to_string(), HeaterPlantConfig::default());
        let rig = ThermalRig::new(&config);
        let mut buf = Vec::new();
        {
            let mut trace = TraceRecorder::new(&mut buf).unwrap();
            trace.record(1.5, &rig).unwrap();
            trace.flush().unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "time,name,kind,temperature,setpoint");
        assert_eq!(lines[1], "1.500,heater_bed,heater,22.00,0.00");
    }
}
